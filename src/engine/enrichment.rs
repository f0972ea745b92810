// ==========================================
// 纺织生产追溯系统 - 跨集合关联读取
// ==========================================
// 存储不支持 JOIN，关联视图按以下步骤拼装:
// 1. 读取 / 扫描基础记录
// 2. 收集去重后的外键
// 3. 每个外键恰好点查一次；同一跳内所有集合共用一个信号量，
//    在途点查总数不超过 enrichment.max_concurrency
// 4. 构造 id → 记录 映射
// 5. 拼装视图；引用缺失时回退到记录自身的织机快照
// 过滤 / 排序在拼装之后于内存中完成
// ==========================================

use crate::domain::fabric_cut::FabricCut;
use crate::domain::loom::{Loom, LoomSnapshot};
use crate::domain::order::{FreedQuantity, Order};
use crate::domain::types::{LoomStatus, OrderStatus, OrderType, WarpStatus};
use crate::domain::warp::Warp;
use crate::engine::allocator::{self, AllocationSummary};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::reader::{ChildReader, PointReader};
use futures::future::join_all;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Semaphore;

// ==========================================
// 扇出读取
// ==========================================

/// 收集去重后的键（保持确定顺序）
pub fn distinct_keys<'a, I>(keys: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    keys.into_iter()
        .filter(|k| !k.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

/// 按主键并发点查，返回 id → 记录；不存在的键不出现在结果中
///
/// `semaphore` 由调用方按跳创建，同一跳内的多个集合共享
pub async fn fetch_by_keys<T, R>(
    reader: &R,
    keys: &[String],
    semaphore: &Semaphore,
) -> RepositoryResult<HashMap<String, T>>
where
    T: Send,
    R: PointReader<T> + ?Sized,
{
    if keys.is_empty() {
        return Ok(HashMap::new());
    }

    let reads = keys.iter().map(|key| {
        async move {
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|e| RepositoryError::InternalError(e.to_string()))?;
            let doc = reader.read_point(key).await?;
            Ok::<_, RepositoryError>((key.clone(), doc))
        }
    });

    let results = join_all(reads).await;
    crate::perf::record_point_reads(keys.len());

    let mut map = HashMap::with_capacity(keys.len());
    for result in results {
        let (key, doc) = result?;
        if let Some(doc) = doc {
            map.insert(key, doc);
        }
    }
    Ok(map)
}

/// 按父键并发读取子记录，返回 父键 → 子记录列表
pub async fn fetch_children_by_keys<T, R>(
    reader: &R,
    parent_keys: &[String],
    semaphore: &Semaphore,
) -> RepositoryResult<HashMap<String, Vec<T>>>
where
    T: Send,
    R: ChildReader<T> + ?Sized,
{
    if parent_keys.is_empty() {
        return Ok(HashMap::new());
    }

    let reads = parent_keys.iter().map(|key| {
        async move {
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|e| RepositoryError::InternalError(e.to_string()))?;
            let children = reader.read_children(key).await?;
            Ok::<_, RepositoryError>((key.clone(), children))
        }
    });

    let results = join_all(reads).await;
    crate::perf::record_point_reads(parent_keys.len());

    let mut map = HashMap::with_capacity(parent_keys.len());
    for result in results {
        let (key, children) = result?;
        map.insert(key, children);
    }
    Ok(map)
}

// ==========================================
// 视图
// ==========================================

/// 织机展示信息（实时记录优先，缺失时取快照）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoomRef {
    pub loom_id: String,
    pub loom_name: String,
    pub company_name: String,
    pub status: Option<LoomStatus>, // 快照回退时为 None
    pub from_snapshot: bool,
}

impl LoomRef {
    fn resolve(loom_id: &str, looms: &HashMap<String, Loom>, snapshot: &LoomSnapshot) -> Self {
        match looms.get(loom_id) {
            Some(loom) => Self {
                loom_id: loom_id.to_string(),
                loom_name: loom.loom_name.clone(),
                company_name: loom.company_name.clone(),
                status: Some(loom.status),
                from_snapshot: false,
            },
            None => Self {
                loom_id: loom_id.to_string(),
                loom_name: snapshot.loom_name.clone(),
                company_name: snapshot.company_name.clone(),
                status: None,
                from_snapshot: true,
            },
        }
    }
}

/// 订单摘要（嵌入经轴 / 布匹视图）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRef {
    pub order_id: String,
    pub order_number: String,
    pub order_type: OrderType,
    pub party_name: String,
    pub status: OrderStatus,
}

impl From<&Order> for OrderRef {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.order_id.clone(),
            order_number: order.order_number.clone(),
            order_type: order.order_type,
            party_name: order.party_name.clone(),
            status: order.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarpView {
    #[serde(flatten)]
    pub warp: Warp,
    pub order: Option<OrderRef>,
    pub loom: Option<LoomRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FabricCutView {
    #[serde(flatten)]
    pub cut: FabricCut,
    pub warp_code: Option<String>,
    pub warp_status: Option<WarpStatus>,
    pub order: Option<OrderRef>,
    pub loom: Option<LoomRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub allocation: Option<AllocationSummary>,
}

// ==========================================
// EnrichOptions - 关联范围
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrichOptions {
    pub include_order: bool,
    pub include_loom: bool,
    pub include_allocation: bool,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            include_order: true,
            include_loom: true,
            include_allocation: true,
        }
    }
}

impl EnrichOptions {
    /// 只取基础记录
    pub fn bare() -> Self {
        Self {
            include_order: false,
            include_loom: false,
            include_allocation: false,
        }
    }
}

// ==========================================
// EnrichmentPipeline - 统一关联管线
// ==========================================
#[derive(Clone)]
pub struct EnrichmentPipeline {
    orders: Arc<dyn PointReader<Order>>,
    looms: Arc<dyn PointReader<Loom>>,
    warps: Arc<dyn PointReader<Warp>>,
    order_warps: Arc<dyn ChildReader<Warp>>,
    freed: Arc<dyn PointReader<FreedQuantity>>,
    max_concurrency: usize,
}

impl EnrichmentPipeline {
    pub fn new(
        orders: Arc<dyn PointReader<Order>>,
        looms: Arc<dyn PointReader<Loom>>,
        warps: Arc<dyn PointReader<Warp>>,
        order_warps: Arc<dyn ChildReader<Warp>>,
        freed: Arc<dyn PointReader<FreedQuantity>>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            orders,
            looms,
            warps,
            order_warps,
            freed,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// 覆盖并发上限（配置变更时按请求生效）
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// 每一跳一个信号量
    fn hop_semaphore(&self) -> Semaphore {
        Semaphore::new(self.max_concurrency)
    }

    async fn fetch_orders(
        &self,
        keys: &[String],
        enabled: bool,
        hop: &Semaphore,
    ) -> RepositoryResult<HashMap<String, Order>> {
        if !enabled {
            return Ok(HashMap::new());
        }
        fetch_by_keys(self.orders.as_ref(), keys, hop).await
    }

    async fn fetch_looms(
        &self,
        keys: &[String],
        enabled: bool,
        hop: &Semaphore,
    ) -> RepositoryResult<HashMap<String, Loom>> {
        if !enabled {
            return Ok(HashMap::new());
        }
        fetch_by_keys(self.looms.as_ref(), keys, hop).await
    }

    /// 经轴 → 订单 / 织机
    pub async fn enrich_warps(
        &self,
        warps: Vec<Warp>,
        options: EnrichOptions,
    ) -> RepositoryResult<Vec<WarpView>> {
        let order_keys = distinct_keys(warps.iter().map(|w| w.order_id.as_str()));
        let loom_keys = distinct_keys(warps.iter().map(|w| w.loom_id.as_str()));

        let hop = self.hop_semaphore();
        let (orders, looms) = futures::try_join!(
            self.fetch_orders(&order_keys, options.include_order, &hop),
            self.fetch_looms(&loom_keys, options.include_loom, &hop),
        )?;

        Ok(warps
            .into_iter()
            .map(|warp| {
                let order = options
                    .include_order
                    .then(|| orders.get(&warp.order_id).map(OrderRef::from))
                    .flatten();
                let loom = options
                    .include_loom
                    .then(|| LoomRef::resolve(&warp.loom_id, &looms, &warp.loom_snapshot));
                WarpView { warp, order, loom }
            })
            .collect())
    }

    /// 布匹 → 经轴 → 订单 / 织机（两级扇出）
    pub async fn enrich_fabric_cuts(
        &self,
        cuts: Vec<FabricCut>,
        options: EnrichOptions,
    ) -> RepositoryResult<Vec<FabricCutView>> {
        let warp_keys = distinct_keys(cuts.iter().map(|c| c.warp_id.as_str()));
        let warps = fetch_by_keys(self.warps.as_ref(), &warp_keys, &self.hop_semaphore()).await?;

        let order_keys = distinct_keys(warps.values().map(|w| w.order_id.as_str()));
        let loom_keys = distinct_keys(warps.values().map(|w| w.loom_id.as_str()));
        let hop = self.hop_semaphore();
        let (orders, looms) = futures::try_join!(
            self.fetch_orders(&order_keys, options.include_order, &hop),
            self.fetch_looms(&loom_keys, options.include_loom, &hop),
        )?;

        Ok(cuts
            .into_iter()
            .map(|cut| {
                let warp = warps.get(&cut.warp_id);
                let order = warp
                    .filter(|_| options.include_order)
                    .and_then(|w| orders.get(&w.order_id))
                    .map(OrderRef::from);
                let loom = options.include_loom.then(|| match warp {
                    Some(w) => LoomRef::resolve(&w.loom_id, &looms, &cut.loom_snapshot),
                    None => LoomRef {
                        loom_id: String::new(),
                        loom_name: cut.loom_snapshot.loom_name.clone(),
                        company_name: cut.loom_snapshot.company_name.clone(),
                        status: None,
                        from_snapshot: true,
                    },
                });
                FabricCutView {
                    warp_code: warp.map(|w| w.warp_code.clone()),
                    warp_status: warp.map(|w| w.status),
                    order,
                    loom,
                    cut,
                }
            })
            .collect())
    }

    /// 订单 → 经轴 + 释放池（分配汇总）
    pub async fn enrich_orders(
        &self,
        orders: Vec<Order>,
        options: EnrichOptions,
    ) -> RepositoryResult<Vec<OrderView>> {
        if !options.include_allocation {
            return Ok(orders
                .into_iter()
                .map(|order| OrderView {
                    order,
                    allocation: None,
                })
                .collect());
        }

        let order_keys = distinct_keys(orders.iter().map(|o| o.order_id.as_str()));
        let hop = self.hop_semaphore();
        let (warps_by_order, freed) = futures::try_join!(
            fetch_children_by_keys(self.order_warps.as_ref(), &order_keys, &hop),
            fetch_by_keys(self.freed.as_ref(), &order_keys, &hop),
        )?;

        Ok(orders
            .into_iter()
            .map(|order| {
                let warps = warps_by_order
                    .get(&order.order_id)
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                let freed_quantity = freed
                    .get(&order.order_id)
                    .map(|f| f.total_freed_quantity)
                    .unwrap_or(0.0);
                let allocation = allocator::summarize(&order, warps, freed_quantity);
                OrderView {
                    order,
                    allocation: Some(allocation),
                }
            })
            .collect())
    }
}

// ==========================================
// 内存过滤 / 排序
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WarpSort {
    #[default]
    CreatedDesc,
    WarpCode,
    LoomName,
}

#[derive(Debug, Clone, Default)]
pub struct WarpQuery {
    pub status: Option<WarpStatus>,
    pub order_id: Option<String>,
    pub loom_id: Option<String>,
    pub company_name: Option<String>,
    pub party_name: Option<String>, // 包含匹配
    pub sort: WarpSort,
}

impl WarpQuery {
    /// 需要订单关联才能判定
    pub fn needs_order(&self) -> bool {
        self.party_name.is_some()
    }

    fn matches(&self, view: &WarpView) -> bool {
        if self.status.is_some_and(|s| s != view.warp.status) {
            return false;
        }
        if self.order_id.as_deref().is_some_and(|id| id != view.warp.order_id) {
            return false;
        }
        if self.loom_id.as_deref().is_some_and(|id| id != view.warp.loom_id) {
            return false;
        }
        if let Some(company) = self.company_name.as_deref() {
            let actual = view
                .loom
                .as_ref()
                .map(|l| l.company_name.as_str())
                .unwrap_or(view.warp.loom_snapshot.company_name.as_str());
            if actual != company {
                return false;
            }
        }
        if let Some(party) = self.party_name.as_deref() {
            let party = party.to_lowercase();
            let hit = view
                .order
                .as_ref()
                .is_some_and(|o| o.party_name.to_lowercase().contains(&party));
            if !hit {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, views: Vec<WarpView>) -> Vec<WarpView> {
        let mut out: Vec<WarpView> = views.into_iter().filter(|v| self.matches(v)).collect();
        match self.sort {
            WarpSort::CreatedDesc => out.sort_by(|a, b| b.warp.created_at.cmp(&a.warp.created_at)),
            WarpSort::WarpCode => out.sort_by(|a, b| compare_codes(&a.warp.warp_code, &b.warp.warp_code)),
            WarpSort::LoomName => out.sort_by(|a, b| {
                let an = a.loom.as_ref().map(|l| l.loom_name.as_str()).unwrap_or("");
                let bn = b.loom.as_ref().map(|l| l.loom_name.as_str()).unwrap_or("");
                an.cmp(bn)
            }),
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FabricCutSort {
    #[default]
    CreatedDesc,
    FabricNumber,
}

#[derive(Debug, Clone, Default)]
pub struct FabricCutQuery {
    pub warp_id: Option<String>,
    pub order_id: Option<String>,
    pub company_name: Option<String>,
    pub inspected: Option<bool>,
    /// 已到验布但未验
    pub awaiting_inspection: bool,
    pub sort: FabricCutSort,
}

impl FabricCutQuery {
    fn matches(&self, view: &FabricCutView) -> bool {
        if self.warp_id.as_deref().is_some_and(|id| id != view.cut.warp_id) {
            return false;
        }
        if let Some(order_id) = self.order_id.as_deref() {
            if view.order.as_ref().map(|o| o.order_id.as_str()) != Some(order_id) {
                return false;
            }
        }
        if let Some(company) = self.company_name.as_deref() {
            let actual = view
                .loom
                .as_ref()
                .map(|l| l.company_name.as_str())
                .unwrap_or(view.cut.loom_snapshot.company_name.as_str());
            if actual != company {
                return false;
            }
        }
        if self.inspected.is_some_and(|i| i != view.cut.inspected) {
            return false;
        }
        if self.awaiting_inspection
            && (view.cut.inspected || view.cut.inspection_arrived_at.is_none())
        {
            return false;
        }
        true
    }

    pub fn apply(&self, views: Vec<FabricCutView>) -> Vec<FabricCutView> {
        let mut out: Vec<FabricCutView> = views.into_iter().filter(|v| self.matches(v)).collect();
        match self.sort {
            FabricCutSort::CreatedDesc => out.sort_by(|a, b| b.cut.created_at.cmp(&a.cut.created_at)),
            FabricCutSort::FabricNumber => out.sort_by(|a, b| {
                compare_codes(&a.cut.fabric_number, &b.cut.fabric_number)
            }),
        }
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub order_type: Option<OrderType>,
    pub party_name: Option<String>,
    /// 仅保留仍有可分配量的订单
    pub with_available_only: bool,
}

impl OrderQuery {
    fn matches(&self, view: &OrderView) -> bool {
        if self.status.is_some_and(|s| s != view.order.status) {
            return false;
        }
        if self.order_type.is_some_and(|t| t != view.order.order_type) {
            return false;
        }
        if let Some(party) = self.party_name.as_deref() {
            if !view
                .order
                .party_name
                .to_lowercase()
                .contains(&party.to_lowercase())
            {
                return false;
            }
        }
        if self.with_available_only {
            let available = view
                .allocation
                .as_ref()
                .map(|a| a.available_quantity)
                .unwrap_or(0.0);
            if available <= allocator::ALLOCATION_EPSILON {
                return false;
            }
        }
        true
    }

    /// 按订单编号排序
    pub fn apply(&self, views: Vec<OrderView>) -> Vec<OrderView> {
        let mut out: Vec<OrderView> = views.into_iter().filter(|v| self.matches(v)).collect();
        out.sort_by(|a, b| compare_codes(&a.order.order_number, &b.order.order_number));
        out
    }
}

/// 编码自然排序: 数字段按数值比较（W2 < W10，W5-03 < W5-03/01 < W5-04）
pub fn compare_codes(a: &str, b: &str) -> Ordering {
    let mut ai = a.chars().peekable();
    let mut bi = b.chars().peekable();
    loop {
        match (ai.peek().copied(), bi.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let mut xs = String::new();
                while let Some(c) = ai.peek().copied().filter(char::is_ascii_digit) {
                    xs.push(c);
                    ai.next();
                }
                let mut ys = String::new();
                while let Some(c) = bi.peek().copied().filter(char::is_ascii_digit) {
                    ys.push(c);
                    bi.next();
                }
                let xn = xs.trim_start_matches('0');
                let yn = ys.trim_start_matches('0');
                let ord = xn.len().cmp(&yn.len()).then_with(|| xn.cmp(yn));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                ai.next();
                bi.next();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Mutex;

    /// 在途读取计数，可在多个读取器间共享
    #[derive(Default)]
    struct InFlightGauge {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl InFlightGauge {
        fn enter(&self) {
            let now = self.in_flight.fetch_add(1, AtomicOrdering::SeqCst) + 1;
            self.peak.fetch_max(now, AtomicOrdering::SeqCst);
        }

        fn leave(&self) {
            self.in_flight.fetch_sub(1, AtomicOrdering::SeqCst);
        }

        fn peak(&self) -> usize {
            self.peak.load(AtomicOrdering::SeqCst)
        }
    }

    /// 记录每个键被点查次数的内存读取器
    struct CountingReader<T: Clone> {
        docs: HashMap<String, T>,
        calls: Mutex<HashMap<String, usize>>,
        gauge: Arc<InFlightGauge>,
    }

    impl<T: Clone> CountingReader<T> {
        fn new(docs: Vec<(&str, T)>) -> Self {
            Self::with_gauge(docs, Arc::new(InFlightGauge::default()))
        }

        fn with_gauge(docs: Vec<(&str, T)>, gauge: Arc<InFlightGauge>) -> Self {
            Self {
                docs: docs.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
                calls: Mutex::new(HashMap::new()),
                gauge,
            }
        }

        fn calls_for(&self, key: &str) -> usize {
            *self.calls.lock().unwrap().get(key).unwrap_or(&0)
        }

        fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().values().sum()
        }
    }

    #[async_trait]
    impl<T: Clone + Send + Sync> PointReader<T> for CountingReader<T> {
        async fn read_point(&self, id: &str) -> RepositoryResult<Option<T>> {
            *self.calls.lock().unwrap().entry(id.to_string()).or_insert(0) += 1;
            self.gauge.enter();
            tokio::task::yield_now().await;
            self.gauge.leave();
            Ok(self.docs.get(id).cloned())
        }
    }

    #[async_trait]
    impl ChildReader<Warp> for CountingReader<Warp> {
        async fn read_children(&self, parent_id: &str) -> RepositoryResult<Vec<Warp>> {
            *self.calls.lock().unwrap().entry(parent_id.to_string()).or_insert(0) += 1;
            Ok(self
                .docs
                .values()
                .filter(|w| w.order_id == parent_id)
                .cloned()
                .collect())
        }
    }

    fn order(id: &str, number: &str, party: &str) -> Order {
        let now = Utc::now().naive_utc();
        Order {
            order_id: id.to_string(),
            order_number: number.to_string(),
            order_type: OrderType::Sales,
            party_name: party.to_string(),
            quality: None,
            order_quantity: 1000.0,
            warping_quantity: 1100.0,
            status: OrderStatus::Running,
            revision: 1,
            created_at: now,
            updated_at: now,
        }
    }

    fn loom(id: &str, name: &str) -> Loom {
        let now = Utc::now().naive_utc();
        Loom {
            loom_id: id.to_string(),
            company_name: "Unit A".to_string(),
            loom_name: name.to_string(),
            status: LoomStatus::Busy,
            created_at: now,
            updated_at: now,
        }
    }

    fn warp(id: &str, code: &str, order_id: &str, loom_id: &str) -> Warp {
        let now = Utc::now().naive_utc();
        Warp {
            warp_id: id.to_string(),
            warp_code: code.to_string(),
            order_id: order_id.to_string(),
            loom_id: loom_id.to_string(),
            quantity: 500.0,
            original_quantity: None,
            used_quantity: None,
            freed_drawdown: 0.0,
            status: WarpStatus::Active,
            start_date: now.date(),
            end_date: None,
            completion_date: None,
            loom_snapshot: LoomSnapshot {
                loom_name: format!("snap-{}", loom_id),
                company_name: "Old Unit".to_string(),
            },
            created_at: now,
            updated_at: now,
        }
    }

    fn cut(id: &str, warp_id: &str, fabric_number: &str) -> FabricCut {
        FabricCut {
            fabric_cut_id: id.to_string(),
            warp_id: warp_id.to_string(),
            fabric_number: fabric_number.to_string(),
            cut_number: 1,
            quantity: 10.0,
            parent_fabric_id: None,
            sub_cut_number: None,
            scan_code: fabric_number.replace('-', "/"),
            loom_snapshot: LoomSnapshot {
                loom_name: "cut-snap".to_string(),
                company_name: "Cut Unit".to_string(),
            },
            inspection_arrived_at: None,
            inspected: false,
            created_at: Utc::now().naive_utc(),
        }
    }

    struct Fixture {
        orders: Arc<CountingReader<Order>>,
        looms: Arc<CountingReader<Loom>>,
        warps: Arc<CountingReader<Warp>>,
        freed: Arc<CountingReader<FreedQuantity>>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                orders: Arc::new(CountingReader::new(vec![
                    ("o1", order("o1", "SO-2026-0001", "Shree Fabrics")),
                    ("o2", order("o2", "SO-2026-0002", "Laxmi Mills")),
                ])),
                looms: Arc::new(CountingReader::new(vec![("l1", loom("l1", "L-01"))])),
                warps: Arc::new(CountingReader::new(vec![
                    ("w1", warp("w1", "W1", "o1", "l1")),
                    ("w2", warp("w2", "W2", "o1", "l-deleted")),
                    ("w3", warp("w3", "W10", "o2", "l1")),
                ])),
                freed: Arc::new(CountingReader::new(vec![(
                    "o2",
                    FreedQuantity {
                        order_id: "o2".to_string(),
                        total_freed_quantity: 50.0,
                        updated_at: Utc::now().naive_utc(),
                    },
                )])),
            }
        }

        fn pipeline(&self, max_concurrency: usize) -> EnrichmentPipeline {
            EnrichmentPipeline::new(
                self.orders.clone(),
                self.looms.clone(),
                self.warps.clone(),
                self.warps.clone(),
                self.freed.clone(),
                max_concurrency,
            )
        }

        fn all_warps(&self) -> Vec<Warp> {
            let mut warps: Vec<Warp> = self.warps.docs.values().cloned().collect();
            warps.sort_by(|a, b| a.warp_id.cmp(&b.warp_id));
            warps
        }
    }

    #[tokio::test]
    async fn test_each_distinct_key_read_once() {
        let fx = Fixture::new();
        let views = fx
            .pipeline(8)
            .enrich_warps(fx.all_warps(), EnrichOptions::default())
            .await
            .unwrap();

        assert_eq!(views.len(), 3);
        assert_eq!(fx.orders.calls_for("o1"), 1);
        assert_eq!(fx.orders.calls_for("o2"), 1);
        assert_eq!(fx.looms.calls_for("l1"), 1);
        assert_eq!(fx.looms.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_loom_falls_back_to_snapshot() {
        let fx = Fixture::new();
        let views = fx
            .pipeline(8)
            .enrich_warps(fx.all_warps(), EnrichOptions::default())
            .await
            .unwrap();

        let w2 = views.iter().find(|v| v.warp.warp_id == "w2").unwrap();
        let loom = w2.loom.as_ref().unwrap();
        assert!(loom.from_snapshot);
        assert_eq!(loom.loom_name, "snap-l-deleted");
        assert_eq!(loom.status, None);

        let w1 = views.iter().find(|v| v.warp.warp_id == "w1").unwrap();
        assert!(!w1.loom.as_ref().unwrap().from_snapshot);
        assert_eq!(w1.order.as_ref().unwrap().order_number, "SO-2026-0001");
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let keys: Vec<String> = (0..20).map(|i| format!("k{}", i)).collect();
        let reader: CountingReader<u32> =
            CountingReader::new(keys.iter().map(|k| (k.as_str(), 1u32)).collect());

        let map = fetch_by_keys(&reader, &keys, &Semaphore::new(3)).await.unwrap();
        assert_eq!(map.len(), 20);
        assert!(reader.gauge.peak() <= 3);
        assert_eq!(reader.total_calls(), 20);
    }

    #[tokio::test]
    async fn test_concurrency_bound_spans_collections_in_one_hop() {
        let gauge = Arc::new(InFlightGauge::default());
        let order_ids: Vec<String> = (0..10).map(|i| format!("o{}", i)).collect();
        let loom_ids: Vec<String> = (0..10).map(|i| format!("l{}", i)).collect();

        let orders = Arc::new(CountingReader::with_gauge(
            order_ids
                .iter()
                .map(|id| (id.as_str(), order(id, id, "Shree Fabrics")))
                .collect(),
            gauge.clone(),
        ));
        let looms = Arc::new(CountingReader::with_gauge(
            loom_ids.iter().map(|id| (id.as_str(), loom(id, id))).collect(),
            gauge.clone(),
        ));
        let warps: Vec<Warp> = (0..10)
            .map(|i| {
                warp(
                    &format!("w{}", i),
                    &format!("W{}", i),
                    &order_ids[i],
                    &loom_ids[i],
                )
            })
            .collect();
        let warp_reader: Arc<CountingReader<Warp>> = Arc::new(CountingReader::new(vec![]));
        let freed: Arc<CountingReader<FreedQuantity>> = Arc::new(CountingReader::new(vec![]));

        let pipeline = EnrichmentPipeline::new(
            orders.clone(),
            looms.clone(),
            warp_reader.clone(),
            warp_reader,
            freed,
            2,
        );
        let views = pipeline
            .enrich_warps(warps, EnrichOptions::default())
            .await
            .unwrap();

        assert_eq!(views.len(), 10);
        assert_eq!(orders.total_calls() + looms.total_calls(), 20);
        assert!(gauge.peak() >= 1);
        assert!(gauge.peak() <= 2, "peak = {}", gauge.peak());
    }

    #[tokio::test]
    async fn test_fabric_cut_two_stage_fanout() {
        let fx = Fixture::new();
        let cuts = vec![
            cut("c1", "w1", "W1-01"),
            cut("c2", "w1", "W1-02"),
            cut("c3", "w2", "W2-01"),
            cut("c4", "w-gone", "W9-01"),
        ];
        let views = fx
            .pipeline(4)
            .enrich_fabric_cuts(cuts, EnrichOptions::default())
            .await
            .unwrap();

        assert_eq!(fx.warps.calls_for("w1"), 1);
        assert_eq!(fx.orders.calls_for("o1"), 1);

        let c1 = views.iter().find(|v| v.cut.fabric_cut_id == "c1").unwrap();
        assert_eq!(c1.warp_code.as_deref(), Some("W1"));
        assert_eq!(c1.loom.as_ref().unwrap().loom_name, "L-01");

        // 经轴存在、织机已删除 → 布匹自身快照
        let c3 = views.iter().find(|v| v.cut.fabric_cut_id == "c3").unwrap();
        assert_eq!(c3.loom.as_ref().unwrap().loom_name, "cut-snap");

        let c4 = views.iter().find(|v| v.cut.fabric_cut_id == "c4").unwrap();
        assert!(c4.order.is_none());
        assert!(c4.loom.as_ref().unwrap().from_snapshot);
    }

    #[tokio::test]
    async fn test_order_allocation_summary() {
        let fx = Fixture::new();
        let orders = vec![
            order("o1", "SO-2026-0001", "Shree Fabrics"),
            order("o2", "SO-2026-0002", "Laxmi Mills"),
        ];
        let views = fx
            .pipeline(8)
            .enrich_orders(orders, EnrichOptions::default())
            .await
            .unwrap();

        let o1 = views[0].allocation.as_ref().unwrap();
        assert_eq!(o1.allocated_quantity, 1000.0);
        assert_eq!(o1.available_quantity, 100.0);
        let o2 = views[1].allocation.as_ref().unwrap();
        assert_eq!(o2.freed_quantity, 50.0);
        assert_eq!(o2.available_quantity, 650.0);
    }

    #[tokio::test]
    async fn test_bare_options_skip_reads() {
        let fx = Fixture::new();
        let views = fx
            .pipeline(8)
            .enrich_warps(fx.all_warps(), EnrichOptions::bare())
            .await
            .unwrap();
        assert!(views.iter().all(|v| v.order.is_none() && v.loom.is_none()));
        assert_eq!(fx.orders.total_calls(), 0);
        assert_eq!(fx.looms.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_in_memory_filter_and_sort() {
        let fx = Fixture::new();
        let views = fx
            .pipeline(8)
            .enrich_warps(fx.all_warps(), EnrichOptions::default())
            .await
            .unwrap();

        let query = WarpQuery {
            party_name: Some("shree".to_string()),
            sort: WarpSort::WarpCode,
            ..Default::default()
        };
        let filtered = query.apply(views.clone());
        assert_eq!(
            filtered.iter().map(|v| v.warp.warp_code.as_str()).collect::<Vec<_>>(),
            vec!["W1", "W2"]
        );

        let all_by_code = WarpQuery {
            sort: WarpSort::WarpCode,
            ..Default::default()
        }
        .apply(views);
        assert_eq!(all_by_code.last().unwrap().warp.warp_code, "W10");
    }

    #[test]
    fn test_compare_codes_natural_order() {
        assert_eq!(compare_codes("W2", "W10"), Ordering::Less);
        assert_eq!(compare_codes("W5-03", "W5-03/01"), Ordering::Less);
        assert_eq!(compare_codes("W5-03/02", "W5-04"), Ordering::Less);
        assert_eq!(compare_codes("SO-2026-0002", "SO-2026-0010"), Ordering::Less);
    }

    #[test]
    fn test_distinct_keys_dedupes_and_skips_empty() {
        assert_eq!(
            distinct_keys(["b", "a", "b", ""]),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
