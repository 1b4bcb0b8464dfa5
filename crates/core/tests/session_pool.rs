// Pool behaviour against a scripted host, driven on paused time.

mod support;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use support::{FakeHost, RecordingHooks, config, wait_until};
use tabpool::{PoolError, PoolPhase, SessionPool};
use tokio::sync::{mpsc, oneshot};

async fn started(host: &FakeHost, min: usize, max: usize) -> Arc<SessionPool<FakeHost>> {
	let pool = SessionPool::new(host.clone(), config(min, max)).expect("valid config");
	pool.start().await.expect("pool starts");
	Arc::new(pool)
}

async fn use_once(pool: &SessionPool<FakeHost>) -> u64 {
	pool.with_session(|session| Box::pin(async move { Ok::<_, PoolError>(session.id) }))
		.await
		.expect("session available")
}

/// Spawns a caller that holds its session until the returned sender fires.
fn hold(pool: &Arc<SessionPool<FakeHost>>, started: &mpsc::UnboundedSender<u64>) -> (oneshot::Sender<()>, tokio::task::JoinHandle<Result<u64, PoolError>>) {
	let (gate_tx, gate_rx) = oneshot::channel::<()>();
	let pool = pool.clone();
	let started = started.clone();
	let task = tokio::spawn(async move {
		pool.with_session(move |session| {
			Box::pin(async move {
				let _ = started.send(session.id);
				let _ = gate_rx.await;
				Ok::<_, PoolError>(session.id)
			})
		})
		.await
	});
	(gate_tx, task)
}

#[tokio::test(start_paused = true)]
async fn start_fills_min_size() {
	let host = FakeHost::new();
	let pool = started(&host, 2, 4).await;

	let status = pool.status();
	assert_eq!(status.phase, PoolPhase::Steady);
	assert_eq!(status.total, 2);
	assert_eq!(status.ready, 2);
	assert!(status.host_connected);
	assert_eq!(host.open_sessions().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn start_is_idempotent() {
	let host = FakeHost::new();
	let pool = started(&host, 1, 1).await;
	pool.start().await.expect("second start is a no-op");
	assert_eq!(host.connect_attempts(), 1);
	assert_eq!(pool.status().total, 1);
}

#[tokio::test(start_paused = true)]
async fn initial_connect_retries_until_host_appears() {
	let host = FakeHost::new();
	host.refuse_connects(true);
	let pool = Arc::new(SessionPool::new(host.clone(), config(1, 1)).expect("valid config"));

	let starting = tokio::spawn({
		let pool = pool.clone();
		async move { pool.start().await }
	});
	tokio::time::sleep(Duration::from_secs(30)).await;
	assert!(!starting.is_finished());
	assert_eq!(pool.phase(), PoolPhase::Initializing);
	// initial connect ignores max_attempts
	assert!(host.connect_attempts() > 3);

	host.refuse_connects(false);
	starting.await.expect("task").expect("start succeeds");
	assert_eq!(pool.phase(), PoolPhase::Steady);
	assert_eq!(pool.status().total, 1);
}

#[tokio::test(start_paused = true)]
async fn reconciler_converges_to_max_size() {
	let host = FakeHost::new();
	let pool = started(&host, 1, 4).await;
	assert_eq!(pool.status().total, 1);

	wait_until("pool at max size", || pool.status().total == 4).await;
	tokio::time::sleep(Duration::from_secs(10)).await;
	assert_eq!(pool.status().total, 4);
	assert_eq!(host.open_sessions().len(), 4);
}

// Two concurrent callers get distinct sessions; a third waits for a release.
#[tokio::test(start_paused = true)]
async fn third_caller_waits_for_release() {
	let host = FakeHost::new();
	let pool = started(&host, 2, 2).await;
	let (started_tx, mut started_rx) = mpsc::unbounded_channel();

	let (first_gate, first) = hold(&pool, &started_tx);
	let (second_gate, second) = hold(&pool, &started_tx);
	let a = started_rx.recv().await.expect("first caller runs");
	let b = started_rx.recv().await.expect("second caller runs");
	assert_ne!(a, b);
	assert_eq!(pool.status().ready, 0);
	assert_eq!(pool.status().total, 2);

	let third = tokio::spawn({
		let pool = pool.clone();
		async move { use_once(&pool).await }
	});
	tokio::time::sleep(Duration::from_secs(5)).await;
	assert!(!third.is_finished());
	assert_eq!(pool.status().total, 2);

	first_gate.send(()).expect("first caller waiting");
	assert_eq!(first.await.expect("task").expect("first result"), a);
	assert_eq!(third.await.expect("task"), a);

	second_gate.send(()).expect("second caller waiting");
	assert_eq!(second.await.expect("task").expect("second result"), b);
	assert_eq!(pool.status().ready, 2);
}

#[tokio::test(start_paused = true)]
async fn caller_error_propagates_after_single_release() {
	let host = FakeHost::new();
	let hooks = RecordingHooks::default();
	let pool = SessionPool::with_hooks(host.clone(), hooks.clone(), config(1, 1)).expect("valid config");
	pool.start().await.expect("pool starts");

	let result: anyhow::Result<()> = pool
		.with_session(|_session| Box::pin(async { Err::<(), _>(anyhow::anyhow!("render failed")) }))
		.await;
	assert_eq!(result.expect_err("caller error").to_string(), "render failed");
	assert_eq!(hooks.returned.load(Ordering::SeqCst), 1);

	// released healthy, so the same session serves the next call
	let status = pool.status();
	assert_eq!((status.ready, status.total), (1, 1));
	assert!(host.closed_sessions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn session_retires_after_max_uses() {
	let host = FakeHost::new();
	let pool = SessionPool::new(host.clone(), config(1, 1).max_uses(3)).expect("valid config");
	pool.start().await.expect("pool starts");

	let first = use_once(&pool).await;
	assert_eq!(use_once(&pool).await, first);
	assert_eq!(use_once(&pool).await, first);
	// third completed use hit the limit
	assert_eq!(host.closed_sessions(), vec![first]);
	assert_eq!(pool.status().total, 0);

	let replacement = use_once(&pool).await;
	assert_ne!(replacement, first);
}

#[tokio::test(start_paused = true)]
async fn idle_session_evicted_once_ttl_elapses() {
	let host = FakeHost::new();
	let pool = SessionPool::new(host.clone(), config(1, 1).ttl(Duration::from_secs(10))).expect("valid config");
	pool.start().await.expect("pool starts");
	let original = host.open_sessions()[0];

	tokio::time::sleep(Duration::from_millis(9_500)).await;
	assert!(host.closed_sessions().is_empty());

	tokio::time::sleep(Duration::from_secs(1)).await;
	assert_eq!(host.closed_sessions(), vec![original]);

	wait_until("replacement session", || pool.status().total == 1).await;
	assert_ne!(host.open_sessions(), vec![original]);
}

#[tokio::test(start_paused = true)]
async fn checked_out_session_is_not_destroyed_mid_use() {
	let host = FakeHost::new();
	let pool = Arc::new(SessionPool::new(host.clone(), config(1, 1).ttl(Duration::from_secs(10))).expect("valid config"));
	pool.start().await.expect("pool starts");
	let (started_tx, mut started_rx) = mpsc::unbounded_channel();

	let (gate, holder) = hold(&pool, &started_tx);
	let id = started_rx.recv().await.expect("holder runs");

	tokio::time::sleep(Duration::from_secs(20)).await;
	assert!(host.closed_sessions().is_empty());
	assert_eq!(pool.status().total, 1);

	gate.send(()).expect("holder waiting");
	holder.await.expect("task").expect("holder result");
	assert_eq!(host.closed_sessions(), vec![id]);
}

#[tokio::test(start_paused = true)]
async fn dead_host_drains_pool_then_recovers() {
	let host = FakeHost::new();
	let pool = started(&host, 2, 2).await;
	let before = host.open_sessions();

	host.kill();
	host.refuse_connects(true);
	tokio::time::sleep(Duration::from_millis(2_100)).await;

	let status = pool.status();
	assert_eq!(status.phase, PoolPhase::Degraded);
	assert_eq!(status.total, 0);
	assert!(!status.host_connected);
	for id in &before {
		assert!(host.closed_sessions().contains(id));
	}

	// exhausting the reconnect budget leaves the pool degraded, not dead
	tokio::time::sleep(Duration::from_secs(10)).await;
	assert_eq!(pool.phase(), PoolPhase::Degraded);

	host.refuse_connects(false);
	wait_until("pool back to steady and full", || {
		let status = pool.status();
		status.phase == PoolPhase::Steady && status.total == 2
	})
	.await;
	assert!(host.open_sessions().iter().all(|id| !before.contains(id)));
}

#[tokio::test(start_paused = true)]
async fn waiting_caller_survives_host_restart() {
	let host = FakeHost::new();
	let pool = started(&host, 1, 1).await;

	host.kill();
	let waiter = tokio::spawn({
		let pool = pool.clone();
		async move { use_once(&pool).await }
	});

	let id = waiter.await.expect("task");
	assert!(id > 1);
	assert_eq!(pool.phase(), PoolPhase::Steady);
}

#[tokio::test(start_paused = true)]
async fn dead_session_is_skipped_at_checkout() {
	let host = FakeHost::new();
	let pool = started(&host, 2, 2).await;
	let ids = host.open_sessions();
	host.kill_session(ids[0]);

	assert_eq!(use_once(&pool).await, ids[1]);
	assert_eq!(host.closed_sessions(), vec![ids[0]]);
	assert_eq!(pool.status().total, 1);
}

#[tokio::test(start_paused = true)]
async fn admission_veto_destroys_and_continues() {
	let host = FakeHost::new();
	let hooks = RecordingHooks::default();
	hooks.veto_next.store(2, Ordering::SeqCst);
	let pool = SessionPool::with_hooks(host.clone(), hooks.clone(), config(1, 2)).expect("valid config");
	pool.start().await.expect("pool starts");

	wait_until("pool full despite vetoes", || pool.status().total == 2).await;
	assert_eq!(host.closed_sessions().len(), 2);
	assert_eq!(hooks.admitted.load(Ordering::SeqCst), 2);
	assert_eq!(host.open_sessions().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_reset_discards_session() {
	let host = FakeHost::new();
	let hooks = RecordingHooks::default();
	hooks.fail_return.store(true, Ordering::SeqCst);
	let pool = SessionPool::with_hooks(host.clone(), hooks.clone(), config(1, 1)).expect("valid config");
	pool.start().await.expect("pool starts");

	let id = pool
		.with_session(|session| Box::pin(async move { Ok::<_, PoolError>(session.id) }))
		.await
		.expect("caller still gets its result");
	assert_eq!(host.closed_sessions(), vec![id]);
	assert_eq!(pool.status().total, 0);
}

#[tokio::test(start_paused = true)]
async fn create_failures_do_not_stop_reconciler() {
	let host = FakeHost::new();
	let pool = started(&host, 1, 3).await;
	host.refuse_opens(true);
	tokio::time::sleep(Duration::from_secs(7)).await;
	assert_eq!(pool.status().total, 1);
	assert_eq!(pool.phase(), PoolPhase::Steady);

	host.refuse_opens(false);
	wait_until("pool full after opens recover", || pool.status().total == 3).await;
}

#[tokio::test(start_paused = true)]
async fn panicking_admission_hook_is_a_veto() {
	let host = FakeHost::new();
	let hooks = RecordingHooks::default();
	let pool = SessionPool::with_hooks(host.clone(), hooks.clone(), config(1, 3)).expect("valid config");
	pool.start().await.expect("pool starts");
	hooks.panic_next.store(1, Ordering::SeqCst);

	wait_until("pool full after hook panic", || pool.status().total == 3).await;
	assert_eq!(host.closed_sessions(), vec![2]);
	assert_eq!(host.open_sessions().len(), 3);
	assert_eq!(hooks.admitted.load(Ordering::SeqCst), 3);
	assert_eq!(pool.phase(), PoolPhase::Steady);
}

#[tokio::test(start_paused = true)]
async fn reconciler_keeps_running_after_host_panic() {
	let host = FakeHost::new();
	let pool = started(&host, 1, 3).await;
	host.panic_opens(1);

	wait_until("pool full after host panic", || pool.status().total == 3).await;

	// later cycles still evict and recover the host
	host.kill();
	wait_until("host reconnected", || host.connect_attempts() == 2).await;
	wait_until("pool refilled after restart", || pool.status().total == 3).await;
	assert_eq!(pool.phase(), PoolPhase::Steady);
}

#[tokio::test(start_paused = true)]
async fn cancelled_waiter_does_not_lose_session() {
	let host = FakeHost::new();
	let pool = started(&host, 1, 1).await;
	let (started_tx, mut started_rx) = mpsc::unbounded_channel();
	let (gate, holder) = hold(&pool, &started_tx);
	let id = started_rx.recv().await.expect("holder runs");

	let waiter = tokio::spawn({
		let pool = pool.clone();
		async move { use_once(&pool).await }
	});
	tokio::time::sleep(Duration::from_millis(100)).await;
	waiter.abort();
	assert!(waiter.await.expect_err("aborted").is_cancelled());

	gate.send(()).expect("holder waiting");
	holder.await.expect("task").expect("holder result");
	assert_eq!(use_once(&pool).await, id);
	assert_eq!(pool.status().total, 1);
}

#[tokio::test(start_paused = true)]
async fn abandoned_session_is_closed_in_background() {
	let host = FakeHost::new();
	let pool = started(&host, 1, 1).await;
	let (started_tx, mut started_rx) = mpsc::unbounded_channel();
	let (_gate, holder) = hold(&pool, &started_tx);
	let id = started_rx.recv().await.expect("holder runs");

	holder.abort();
	let _ = holder.await;
	wait_until("abandoned session closed", || host.closed_sessions() == vec![id]).await;
	wait_until("replacement created", || pool.status().total == 1).await;
	assert_ne!(use_once(&pool).await, id);
}

#[tokio::test(start_paused = true)]
async fn panicking_caller_discards_session() {
	let host = FakeHost::new();
	let pool = started(&host, 1, 1).await;
	let id = host.open_sessions()[0];

	let outcome = tokio::spawn({
		let pool = pool.clone();
		async move {
			pool.with_session(|session| {
				Box::pin(async move {
					if session.id > 0 {
						panic!("caller bug");
					}
					Ok::<_, PoolError>(())
				})
			})
			.await
		}
	})
	.await;
	assert!(outcome.expect_err("caller panicked").is_panic());

	wait_until("panicked session closed", || host.closed_sessions() == vec![id]).await;
	assert_eq!(pool.status().ready, 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_everything_and_fails_waiters() {
	let host = FakeHost::new();
	let pool = started(&host, 2, 2).await;
	let (started_tx, mut started_rx) = mpsc::unbounded_channel();
	let (gate_a, holder_a) = hold(&pool, &started_tx);
	let (gate_b, holder_b) = hold(&pool, &started_tx);
	started_rx.recv().await.expect("holder a runs");
	started_rx.recv().await.expect("holder b runs");

	let waiter = tokio::spawn({
		let pool = pool.clone();
		async move { pool.with_session(|session| Box::pin(async move { Ok::<_, PoolError>(session.id) })).await }
	});
	tokio::time::sleep(Duration::from_millis(100)).await;

	pool.shutdown().await;
	assert!(matches!(waiter.await.expect("task"), Err(PoolError::Closed)));
	assert_eq!(pool.phase(), PoolPhase::Shutdown);
	assert!(!pool.status().host_connected);

	let _ = gate_a.send(());
	let _ = gate_b.send(());
	holder_a.await.expect("task").expect("holder a finishes its work");
	holder_b.await.expect("task").expect("holder b finishes its work");
	assert_eq!(host.closed_sessions().len(), 2);

	let attempts = host.connect_attempts();
	tokio::time::sleep(Duration::from_secs(30)).await;
	assert!(host.open_sessions().is_empty());
	assert_eq!(host.connect_attempts(), attempts);
	assert_eq!(pool.status().total, 0);

	pool.shutdown().await;
	assert!(matches!(pool.start().await, Err(PoolError::Closed)));
	assert!(matches!(use_once_result(&pool).await, Err(PoolError::Closed)));
}

async fn use_once_result(pool: &SessionPool<FakeHost>) -> Result<u64, PoolError> {
	pool.with_session(|session| Box::pin(async move { Ok::<_, PoolError>(session.id) })).await
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_initial_connect() {
	let host = FakeHost::new();
	host.refuse_connects(true);
	let pool = Arc::new(SessionPool::new(host.clone(), config(1, 1)).expect("valid config"));
	let starting = tokio::spawn({
		let pool = pool.clone();
		async move { pool.start().await }
	});
	tokio::time::sleep(Duration::from_secs(3)).await;

	pool.shutdown().await;
	assert!(matches!(starting.await.expect("task"), Err(PoolError::Closed)));
	assert_eq!(pool.phase(), PoolPhase::Shutdown);
}

#[test]
fn invalid_config_is_rejected() {
	let err = SessionPool::new(FakeHost::new(), config(3, 2)).err().expect("min above max");
	assert!(matches!(err, PoolError::InvalidConfig(_)));
}
