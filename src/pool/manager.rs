//! 连接池管理器
//!
//! 持有唯一的活动客户端，后台定期做健康检查，连接失效时用原始地址
//! 重新构建并验证新客户端，验证通过后原子替换，旧客户端延迟关闭。

use arc_swap::ArcSwap;
use chrono::Utc;
use mongodb::bson::doc;
use parking_lot::Mutex;
use rat_logger::{debug, error, info, warn};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::config::PoolConfig;
use super::types::{HealthStatus, Metrics, MetricsSnapshot};
use crate::adapter::{ClientFactory, StoreClient};
use crate::context::Context;
use crate::error::{QuickDbError, QuickDbResult};

/// 原子标志守卫，离开作用域时复位
struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    /// 标志未被占用时占用并返回守卫
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(Self(flag))
        }
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// 给存储调用加上超时，超时按存储超时错误处理
async fn with_timeout<T, Fut>(limit: Duration, what: &str, fut: Fut) -> QuickDbResult<T>
where
    Fut: Future<Output = QuickDbResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(crate::quick_error!(
            store,
            Timeout,
            format!("{}超时({:?})", what, limit)
        )),
    }
}

struct Inner<F: ClientFactory> {
    factory: F,
    uri: String,
    config: PoolConfig,
    client: ArcSwap<F::Client>,
    is_checking: AtomicBool,
    is_recovering: AtomicBool,
    is_started: AtomicBool,
    /// 连续失败次数，健康检查成功或恢复成功后清零
    failure_count: AtomicU32,
    metrics: Metrics,
    health_cache: Mutex<Option<(Instant, bool)>>,
    /// 当前一轮运行的停止信号，`stop` 时取消并换成新的
    shutdown: Mutex<Context>,
    keepalive_handle: Mutex<Option<JoinHandle<()>>>,
}

/// 连接池管理器
///
/// 克隆后共享同一个活动客户端和后台任务
pub struct PoolManager<F: ClientFactory> {
    inner: Arc<Inner<F>>,
}

impl<F: ClientFactory> Clone for PoolManager<F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<F: ClientFactory> std::fmt::Debug for PoolManager<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolManager")
            .field("failure_count", &self.failure_count())
            .field("is_recovering", &self.is_recovering())
            .field("metrics", &self.metrics())
            .finish()
    }
}

impl<F: ClientFactory> PoolManager<F> {
    /// 创建管理器并建立初始连接
    ///
    /// 初始连接失败直接返回错误
    pub async fn new(factory: F, uri: impl Into<String>, config: PoolConfig) -> QuickDbResult<Self> {
        let uri = uri.into();
        let client = factory.connect(&uri).await.map_err(|e| {
            error!("创建初始数据库连接失败: {}", e);
            e
        })?;
        info!("连接池管理器初始化完成");

        Ok(Self {
            inner: Arc::new(Inner {
                factory,
                uri,
                config,
                client: ArcSwap::from_pointee(client),
                is_checking: AtomicBool::new(false),
                is_recovering: AtomicBool::new(false),
                is_started: AtomicBool::new(false),
                failure_count: AtomicU32::new(0),
                metrics: Metrics::default(),
                health_cache: Mutex::new(None),
                shutdown: Mutex::new(Context::background()),
                keepalive_handle: Mutex::new(None),
            }),
        })
    }

    /// 当前活动客户端
    pub fn client(&self) -> Arc<F::Client> {
        self.inner.client.load_full()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.failure_count.load(Ordering::SeqCst)
    }

    pub fn is_recovering(&self) -> bool {
        self.inner.is_recovering.load(Ordering::SeqCst)
    }

    fn shutdown_context(&self) -> Context {
        self.inner.shutdown.lock().clone()
    }

    /// 执行 future，调用方上下文取消或管理器停止时提前返回
    async fn guarded<T, Fut>(&self, ctx: &Context, fut: Fut) -> QuickDbResult<T>
    where
        Fut: Future<Output = QuickDbResult<T>>,
    {
        self.shutdown_context().run(ctx.run(fut)).await
    }

    /// 启动后台健康检查任务
    ///
    /// 立即检查一次，之后按间隔检查；`ctx` 取消或调用 `stop` 后退出。
    /// 重复调用不会启动第二个任务。
    pub fn start(&self, ctx: &Context) {
        if self.inner.is_started.swap(true, Ordering::SeqCst) {
            debug!("健康检查任务已在运行");
            return;
        }

        let weak: Weak<Inner<F>> = Arc::downgrade(&self.inner);
        let ctx = ctx.clone();
        let shutdown = self.shutdown_context();
        let check_interval = self.inner.config.check_interval();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(check_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = ctx.done() => break,
                    _ = shutdown.done() => break,
                }

                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let manager = PoolManager { inner };
                manager.run_check().await;
            }
            if let Some(inner) = weak.upgrade() {
                inner.is_started.store(false, Ordering::SeqCst);
            }
            debug!("健康检查任务退出");
        });

        *self.inner.keepalive_handle.lock() = Some(handle);
        info!("健康检查任务已启动，间隔 {:?}", check_interval);
    }

    /// 停止后台任务，之后可以再次 `start`
    pub async fn stop(&self) {
        let shutdown = std::mem::replace(&mut *self.inner.shutdown.lock(), Context::background());
        shutdown.cancel();
        let handle = self.inner.keepalive_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("等待健康检查任务退出失败: {}", e);
            }
        }
        self.inner.is_started.store(false, Ordering::SeqCst);
    }

    /// 停止后台任务并关闭当前客户端
    pub async fn close(&self) -> QuickDbResult<()> {
        self.stop().await;
        let client = self.client();
        with_timeout(self.inner.config.close_timeout(), "关闭客户端", client.disconnect()).await?;
        info!("连接池管理器已关闭");
        Ok(())
    }

    /// 立即执行一次完整健康检查
    ///
    /// 已有检查在进行时返回 None
    pub async fn check_now(&self) -> Option<HealthStatus> {
        self.run_check().await
    }

    async fn run_check(&self) -> Option<HealthStatus> {
        let Some(_guard) = FlagGuard::acquire(&self.inner.is_checking) else {
            debug!("上一次健康检查尚未结束，跳过");
            return None;
        };

        let status = self.perform_check().await;
        self.inner.metrics.record_check(status.is_healthy, status.timestamp);
        self.store_health(status.is_healthy);

        if status.is_healthy {
            self.inner.failure_count.store(0, Ordering::SeqCst);
            debug!("健康检查通过，耗时 {:?}", status.latency);
        } else {
            let failures = self.inner.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
            error!(
                "健康检查失败(连续{}次): {}",
                failures,
                status.error.as_deref().unwrap_or("未知错误")
            );
            self.spawn_recovery();
        }

        Some(status)
    }

    async fn perform_check(&self) -> HealthStatus {
        let client = self.client();
        let limit = self.inner.config.check_timeout();
        let started = Instant::now();

        let result = async {
            with_timeout(limit, "健康检查探测", client.ping()).await?;
            with_timeout(
                limit,
                "健康检查命令",
                client.run_command("admin", doc! { "ping": 1 }),
            )
            .await?;
            Ok::<(), QuickDbError>(())
        }
        .await;
        let latency = started.elapsed();

        if result.is_ok() {
            if let Err(e) = with_timeout(
                limit,
                "服务器状态检查",
                client.run_command("admin", doc! { "serverStatus": 1 }),
            )
            .await
            {
                debug!("服务器状态检查失败，不影响健康判定: {}", e);
            }
        }

        HealthStatus {
            is_healthy: result.is_ok(),
            latency,
            error: result.err().map(|e| e.to_string()),
            timestamp: Utc::now(),
        }
    }

    fn store_health(&self, healthy: bool) {
        *self.inner.health_cache.lock() = Some((Instant::now(), healthy));
    }

    /// 快速探测，不使用缓存
    async fn probe(&self) -> bool {
        let client = self.client();
        let healthy = matches!(
            tokio::time::timeout(self.inner.config.quick_check_timeout(), client.ping()).await,
            Ok(Ok(()))
        );
        self.store_health(healthy);
        healthy
    }

    /// 快速健康判断
    ///
    /// 缓存时长内复用最近一次结果，否则发起一次快速探测
    pub async fn is_healthy(&self) -> bool {
        let ttl = self.inner.config.health_cache_ttl();
        if !ttl.is_zero() {
            if let Some((at, healthy)) = *self.inner.health_cache.lock() {
                if at.elapsed() < ttl {
                    return healthy;
                }
            }
        }
        self.probe().await
    }

    fn spawn_recovery(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            manager.try_recover().await;
        });
    }

    /// 尝试恢复连接
    ///
    /// 同一时间只有一个恢复流程，已有恢复在进行时直接返回 false。
    /// 成功替换客户端返回 true。
    pub async fn try_recover(&self) -> bool {
        self.recover(&Context::background()).await
    }

    /// 恢复连接，`ctx` 取消或管理器停止时在下一个等待点放弃
    async fn recover(&self, ctx: &Context) -> bool {
        let Some(_guard) = FlagGuard::acquire(&self.inner.is_recovering) else {
            debug!("已有恢复流程在进行，跳过");
            return false;
        };

        self.inner.metrics.record_recovery_attempt();
        let config = &self.inner.config;

        let failures = self.inner.failure_count.load(Ordering::SeqCst);
        if failures > config.failure_threshold {
            debug!("连续失败{}次，等待 {:?} 后再重连", failures, config.stabilization_delay());
            if let Err(e) = self.guarded(ctx, ctx.sleep(config.stabilization_delay())).await {
                debug!("放弃恢复: {}", e);
                return false;
            }
        }

        for attempt in 0..=config.max_retries {
            if attempt > 0 {
                let delay = config.backoff_delay(attempt);
                debug!("第{}次重连前等待 {:?}", attempt, delay);
                if let Err(e) = self.guarded(ctx, ctx.sleep(delay)).await {
                    debug!("放弃恢复: {}", e);
                    return false;
                }
            }

            debug!("尝试重建数据库连接 ({}/{})", attempt + 1, config.max_retries + 1);
            let candidate = match self
                .guarded(
                    ctx,
                    with_timeout(
                        config.recover_timeout(),
                        "创建新客户端",
                        self.inner.factory.connect(&self.inner.uri),
                    ),
                )
                .await
            {
                Ok(candidate) => candidate,
                Err(QuickDbError::Cancelled { message }) => {
                    debug!("放弃恢复: {}", message);
                    return false;
                }
                Err(e) => {
                    error!("创建新客户端失败 ({}/{}): {}", attempt + 1, config.max_retries + 1, e);
                    continue;
                }
            };

            if let Err(e) = self.guarded(ctx, self.validate(&candidate)).await {
                if let Err(close_err) =
                    with_timeout(config.close_timeout(), "关闭候选客户端", candidate.disconnect()).await
                {
                    debug!("关闭候选客户端失败: {}", close_err);
                }
                if let QuickDbError::Cancelled { message } = &e {
                    debug!("放弃恢复: {}", message);
                    return false;
                }
                error!("新客户端验证失败 ({}/{}): {}", attempt + 1, config.max_retries + 1, e);
                continue;
            }

            let old = self.inner.client.swap(Arc::new(candidate));
            self.inner.failure_count.store(0, Ordering::SeqCst);
            self.inner.metrics.record_recovery_success();
            self.store_health(true);
            info!("数据库连接已恢复，已切换到新客户端");

            self.schedule_close(old);
            return true;
        }

        error!("重连{}次后仍无法恢复数据库连接，继续使用旧客户端", config.max_retries + 1);
        false
    }

    async fn validate(&self, candidate: &F::Client) -> QuickDbResult<()> {
        let config = &self.inner.config;
        with_timeout(config.recovery_ping_timeout(), "恢复探测", candidate.ping()).await?;
        with_timeout(
            config.recovery_query_timeout(),
            "恢复验证命令",
            candidate.run_command("admin", doc! { "ping": 1 }),
        )
        .await?;
        if let Err(e) = with_timeout(
            config.recovery_query_timeout(),
            "恢复服务器状态检查",
            candidate.run_command("admin", doc! { "serverStatus": 1 }),
        )
        .await
        {
            debug!("新客户端服务器状态检查失败，忽略: {}", e);
        }
        Ok(())
    }

    /// 延迟关闭被替换下来的客户端
    fn schedule_close(&self, old: Arc<F::Client>) {
        let weak = Arc::downgrade(&self.inner);
        let close_delay = self.inner.config.close_delay();
        let close_timeout = self.inner.config.close_timeout();

        tokio::spawn(async move {
            tokio::time::sleep(close_delay).await;

            if let Some(inner) = weak.upgrade() {
                if Arc::ptr_eq(&inner.client.load_full(), &old) {
                    debug!("旧客户端仍是活动客户端，取消关闭");
                    return;
                }
            }

            match with_timeout(close_timeout, "关闭旧客户端", old.disconnect()).await {
                Ok(()) => debug!("旧客户端已关闭"),
                Err(e) => error!("关闭旧客户端失败: {}", e),
            }
        });
    }

    /// 等待连接恢复健康
    ///
    /// 需要连续 `wait_needed` 次快速探测成功，中途失败重新计数
    pub async fn wait_for_healthy(&self, ctx: &Context, timeout: Duration) -> QuickDbResult<()> {
        let config = &self.inner.config;
        let needed = config.wait_needed.max(1);
        let deadline = Instant::now() + timeout;
        let mut consecutive = 0u32;

        loop {
            ctx.err()?;
            if self.probe().await {
                consecutive += 1;
                debug!("连接健康探测成功 ({}/{})", consecutive, needed);
                if consecutive >= needed {
                    return Ok(());
                }
            } else {
                if consecutive > 0 {
                    debug!("连接健康探测失败，重新计数");
                }
                consecutive = 0;
            }

            let now = Instant::now();
            if now >= deadline {
                warn!("等待连接恢复健康超时({:?})", timeout);
                return Err(crate::quick_error!(
                    pool,
                    format!("等待连接恢复健康超时({:?})", timeout)
                ));
            }
            let wait = config.wait_interval().min(deadline - now);
            ctx.sleep(wait).await?;
        }
    }

    /// 批量操作前的准备
    ///
    /// 连接不健康时触发恢复并等待，然后预热连接
    pub async fn prepare_for_bulk_operation(&self, ctx: &Context) -> QuickDbResult<()> {
        if !self.is_healthy().await {
            warn!("批量操作前连接不健康，等待恢复");
            self.spawn_recovery();
            self.wait_for_healthy(ctx, self.inner.config.recover_timeout())
                .await?;
        }
        self.warmup(ctx).await
    }

    /// 发送若干轻量命令预先建立池中连接
    pub async fn warmup(&self, ctx: &Context) -> QuickDbResult<()> {
        let config = &self.inner.config;
        let client = self.client();
        for i in 0..config.warmup_count {
            ctx.err()?;
            if let Err(e) = with_timeout(
                config.quick_check_timeout(),
                "预热命令",
                client.run_command("admin", doc! { "ping": 1 }),
            )
            .await
            {
                debug!("预热命令失败: {}", e);
            }
            if i + 1 < config.warmup_count {
                ctx.sleep(config.warmup_interval()).await?;
            }
        }
        debug!("连接预热完成({}次)", config.warmup_count);
        Ok(())
    }

    /// 守护执行
    ///
    /// 操作失败且连接不健康时，同步恢复连接并等待健康，然后对新客户端重试一次。
    /// 业务错误和连接仍健康时的失败原样返回。
    pub async fn execute<T, Op, Fut>(&self, ctx: &Context, op: Op) -> QuickDbResult<T>
    where
        Op: Fn(Arc<F::Client>) -> Fut,
        Fut: Future<Output = QuickDbResult<T>>,
    {
        ctx.err()?;
        let err = match op(self.client()).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        ctx.err()?;

        if err.is_local_error() || err.is_business_error() {
            debug!("业务错误，直接返回: {}", err);
            return Err(err);
        }

        if self.probe().await {
            debug!("操作失败但连接健康，按业务错误返回: {}", err);
            return Err(err);
        }

        warn!("操作失败且连接不健康，开始恢复: {}", err);
        self.recover(ctx).await;

        if let Err(wait_err) = self
            .wait_for_healthy(ctx, self.inner.config.execute_wait_timeout())
            .await
        {
            ctx.err()?;
            error!("连接恢复失败: {}", wait_err);
            return Err(QuickDbError::RecoveryFailed {
                source: Box::new(err),
            });
        }

        debug!("连接已恢复，重试操作");
        op(self.client()).await
    }
}
