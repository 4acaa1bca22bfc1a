//! # olap-segment-index 使用案例
//!
//! 1. 启动索引 actor
//! 2. 登记两个按区域分批加载的 segment，并在 worker 线程上完成加载
//! 3. 精确查找
//! 4. Rollup 搜索：两个区域 segment 联合还原按年的汇总
//! 5. 区域失效：排除 West 后 rollup 不再可用
//! 6. 打印缓存状态

use std::collections::BTreeMap;
use std::thread;
use olap_segment_index::{
    BitKey, SegmentCacheActor, SegmentColumn, SegmentHeader, SegmentIdentity,
    SegmentIndexConfig, Value,
};

const YEAR: usize = 0;
const REGION: usize = 1;

fn region_segment(identity: &SegmentIdentity, region: &str) -> SegmentHeader {
    SegmentHeader::new(
        identity.clone(),
        BitKey::from_bits([YEAR, REGION]),
        vec![
            SegmentColumn::wildcard("time.year", Some(2)),
            SegmentColumn::with_values("store.region", [region], Some(2)),
        ],
        vec![],
        vec![],
    )
}

fn main() -> olap_segment_index::Result<()> {
    println!("═══════════════════════════════════════════════════════════");
    println!("   segment 缓存索引演示                                     ");
    println!("═══════════════════════════════════════════════════════════\n");

    // =========================================================================
    // 1. 启动 actor
    // =========================================================================
    println!("【1】启动索引 actor ...");
    let actor: SegmentCacheActor<Vec<f64>, ()> = SegmentCacheActor::spawn(SegmentIndexConfig::default())?;
    let cache = actor.handle();
    let identity = SegmentIdentity::new("FoodMart", "c0ffee", "Sales", "Unit Sales", "sales_fact_1997");
    println!("    ✓ OK\n");

    // =========================================================================
    // 2. 登记并加载
    // =========================================================================
    println!("【2】登记 East / West 两个 segment，并在 worker 线程加载 ...");
    let east = region_segment(&identity, "East");
    let west = region_segment(&identity, "West");
    let mut workers = Vec::new();
    for (header, cells) in [(east.clone(), vec![120.0, 98.5]), (west.clone(), vec![87.0, 110.25])] {
        cache.add(header.clone(), true, None)?;
        let cache = cache.clone();
        workers.push(thread::spawn(move || cache.load_succeeded(header, cells)));
    }
    for w in workers {
        if let Ok(result) = w.join() {
            result?;
        }
    }
    if let Some(future) = cache.get_future(east.clone())? {
        if let Ok(body) = future.wait() {
            println!("    East body = {:?}", body);
        }
    }
    println!();

    // =========================================================================
    // 3. 精确查找
    // =========================================================================
    println!("【3】精确查找 year=1997, region=East ...");
    let coords = BTreeMap::from([
        ("time.year".to_string(), Value::from(1997)),
        ("store.region".to_string(), Value::from("East")),
    ]);
    let found = cache.locate(identity.clone(), BitKey::from_bits([YEAR, REGION]), coords, vec![])?;
    for h in &found {
        println!("    {h}");
    }
    println!();

    // =========================================================================
    // 4. Rollup
    // =========================================================================
    println!("【4】Rollup：请求 year=1997（汇总全部区域）...");
    let year_only = BTreeMap::from([("time.year".to_string(), Value::from(1997))]);
    let groups = cache.find_rollup_candidates(
        identity.clone(), BitKey::from_bits([YEAR]), year_only.clone(), vec![])?;
    for (i, group) in groups.iter().enumerate() {
        println!("    候选组 {i}: {} 个 segment", group.len());
    }
    println!();

    // =========================================================================
    // 5. 区域失效
    // =========================================================================
    println!("【5】失效 region=West ...");
    let stale = vec![SegmentColumn::with_values("store.region", ["West"], None)];
    for hit in cache.intersect_region(identity.clone(), stale.clone())? {
        cache.update(hit.clone(), hit.with_excluded_regions(&stale))?;
    }
    let groups = cache.find_rollup_candidates(
        identity.clone(), BitKey::from_bits([YEAR]), year_only, vec![])?;
    println!("    rollup 候选组数 = {}（预期 0，应回退到 SQL）\n", groups.len());

    // =========================================================================
    // 6. 缓存状态
    // =========================================================================
    println!("【6】缓存状态 ...");
    print!("{}", cache.cache_state()?);
    Ok(())
}
