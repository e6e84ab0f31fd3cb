//! Daemon wiring and the poll loop.
//!
//! Each tick runs, in order: engine notifications, source reconciliation,
//! the pending operator command, one detection cycle, and status publish.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::api::ApiServer;
use crate::config::Config;
use crate::detection::{Aggregator, OsProbe, SystemProbe, SystemSnapshot};
use crate::obs::{ClientEvent, ClientOptions, ObsClient, RecordingEngine, SceneControl};
use crate::recorder::{
    CommandSlot, DaemonCommand, EngineNotification, MachineSettings, RecorderMachine,
    StatusHandle, Transition,
};
use crate::sources::SourceReconciler;

/// Everything built at startup and shared by the daemon's components.
pub struct DaemonContext {
    pub config_path: PathBuf,
    pub config: Config,
    pub client: ObsClient,
    pub status: StatusHandle,
    pub commands: CommandSlot,
    pub shutdown: CancellationToken,
}

impl DaemonContext {
    pub fn build(config_path: PathBuf, config: Config) -> Result<Self> {
        let options =
            ClientOptions::from_config(&config.obs).context("Invalid [obs] configuration")?;
        let shutdown = CancellationToken::new();
        Ok(Self {
            config_path,
            config,
            client: ObsClient::with_cancel(options, shutdown.child_token()),
            status: StatusHandle::default(),
            commands: CommandSlot::default(),
            shutdown,
        })
    }
}

fn notification_for(event: &ClientEvent) -> Option<EngineNotification> {
    match event {
        ClientEvent::Connected { .. } => Some(EngineNotification::Connected),
        ClientEvent::Disconnected { reason } => Some(EngineNotification::Disconnected {
            reason: reason.clone(),
        }),
        ClientEvent::Engine(event) => EngineNotification::from_event(event),
    }
}

pub async fn run_service(config_path: Option<PathBuf>) -> Result<()> {
    info!("Starting meetrec daemon");

    let config_path = match config_path {
        Some(path) => path,
        None => Config::config_path()?,
    };
    let config = Config::load_or_create(&config_path)?;

    let ctx = DaemonContext::build(config_path, config)?;

    let (notify_tx, notify_rx) = mpsc::unbounded_channel();
    ctx.client.subscribe(move |event| {
        if let Some(notification) = notification_for(event) {
            let _ = notify_tx.send(notification);
        }
    });
    ctx.client.start();

    let api_server = ApiServer::new(ctx.config.api.port, ctx.commands.clone(), ctx.status.clone());
    let api_shutdown = ctx.shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = api_server.start(api_shutdown).await {
            error!("API server failed: {:#}", e);
        }
    });

    let signal_shutdown = ctx.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            signal_shutdown.cancel();
        }
    });

    info!("meetrec is ready!");
    info!(
        "Control it with: curl -X POST http://127.0.0.1:{}/toggle",
        ctx.config.api.port
    );

    let mut daemon = Daemon::new(ctx, notify_rx)?;
    daemon.run().await;
    daemon.shutdown().await;

    info!("meetrec stopped");
    Ok(())
}

type SharedProbe = Arc<Mutex<Box<dyn SystemProbe>>>;

struct Daemon {
    ctx: DaemonContext,
    engine: Arc<dyn RecordingEngine>,
    scene: Arc<dyn SceneControl>,
    probe: SharedProbe,
    aggregator: Aggregator,
    machine: RecorderMachine,
    reconciler: SourceReconciler,
    notifications: mpsc::UnboundedReceiver<EngineNotification>,
    poll_interval: Duration,
}

enum Flow {
    Continue,
    Quit,
}

impl Daemon {
    fn new(
        ctx: DaemonContext,
        notifications: mpsc::UnboundedReceiver<EngineNotification>,
    ) -> Result<Self> {
        let client = Arc::new(ctx.client.clone());
        Self::with_backends(
            ctx,
            notifications,
            client.clone(),
            client,
            Box::new(OsProbe::new()),
        )
    }

    fn with_backends(
        ctx: DaemonContext,
        notifications: mpsc::UnboundedReceiver<EngineNotification>,
        engine: Arc<dyn RecordingEngine>,
        scene: Arc<dyn SceneControl>,
        probe: Box<dyn SystemProbe>,
    ) -> Result<Self> {
        let aggregator =
            Aggregator::from_rules(&ctx.config.rules, ctx.config.detection.min_confidence)?;
        info!("{} meeting detectors registered", aggregator.len());

        let machine = RecorderMachine::new(
            engine.clone(),
            MachineSettings::from_config(&ctx.config.detection),
        );
        let reconciler = SourceReconciler::new(ctx.config.sources.clone());
        let poll_interval = ctx.config.detection.poll_interval();

        Ok(Self {
            ctx,
            engine,
            scene,
            probe: Arc::new(Mutex::new(probe)),
            aggregator,
            machine,
            reconciler,
            notifications,
            poll_interval,
        })
    }

    async fn run(&mut self) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.ctx.shutdown.cancelled() => break,
            }

            // a tick may be waiting on OBS; shutdown must not wait for it
            let shutdown = self.ctx.shutdown.clone();
            let flow = tokio::select! {
                flow = self.tick(Instant::now()) => flow,
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested during a poll cycle");
                    break;
                }
            };
            if let Flow::Quit = flow {
                break;
            }

            if interval.period() != self.poll_interval {
                info!("Poll interval now {}s", self.poll_interval.as_secs());
                interval = tokio::time::interval(self.poll_interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                interval.reset();
            }
        }
    }

    async fn tick(&mut self, now: Instant) -> Flow {
        while let Ok(notification) = self.notifications.try_recv() {
            match notification {
                EngineNotification::Connected
                | EngineNotification::Disconnected { .. }
                | EngineNotification::ScenesChanged => self.reconciler.invalidate(),
                _ => {}
            }
            self.machine.handle_notification(notification, now).await;
        }

        if self.engine.is_connected() && self.reconciler.needs_reconcile(now) {
            self.reconciler.reconcile(self.scene.as_ref(), now).await;
        }

        if let Some(command) = self.ctx.commands.take() {
            if self.starts_session(command)
                && self.engine.is_connected()
                && !self.reconciler.is_armed()
            {
                // a manual start re-checks the scene and re-arms on success
                self.reconciler.reconcile(self.scene.as_ref(), now).await;
            }

            match self.machine.handle_command(command, now).await {
                Transition::Quit => {
                    info!("Quit requested");
                    return Flow::Quit;
                }
                Transition::Reload => self.reload(),
                _ => {}
            }
        }

        match self.capture().await {
            Ok(snapshot) => {
                let aggregation = self.aggregator.evaluate(&snapshot);
                debug!(
                    "Detection: {} ({}), {} signals set",
                    aggregation.result.detected_app,
                    aggregation.result.confidence.as_str(),
                    aggregation.signals.iter().filter(|(_, set)| *set).count()
                );
                self.machine
                    .evaluate(aggregation.result, self.reconciler.is_armed(), now)
                    .await;
            }
            Err(e) => warn!("System snapshot failed: {:#}", e),
        }

        self.ctx
            .status
            .publish(
                self.machine
                    .snapshot(self.engine.is_connected(), self.reconciler.health()),
            )
            .await;

        Flow::Continue
    }

    fn starts_session(&self, command: DaemonCommand) -> bool {
        match command {
            DaemonCommand::Start => true,
            DaemonCommand::Toggle => self.machine.session().is_none(),
            _ => false,
        }
    }

    /// Run the blocking process/window scan off the async workers.
    async fn capture(&self) -> Result<SystemSnapshot> {
        let probe = Arc::clone(&self.probe);
        tokio::task::spawn_blocking(move || {
            probe
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .snapshot()
        })
        .await
        .context("Snapshot task panicked")?
    }

    fn reload(&mut self) {
        match self.try_reload(&self.ctx.config_path.clone()) {
            Ok(()) => info!("Configuration reloaded from {:?}", self.ctx.config_path),
            Err(e) => warn!("Reload failed, keeping current configuration: {:#}", e),
        }
    }

    fn try_reload(&mut self, path: &Path) -> Result<()> {
        let config = Config::load_from(path)?;
        let aggregator = Aggregator::from_rules(&config.rules, config.detection.min_confidence)?;

        self.aggregator = aggregator;
        self.machine
            .apply_settings(MachineSettings::from_config(&config.detection));
        if config.sources != self.ctx.config.sources {
            self.reconciler.update_config(config.sources.clone());
        }
        self.poll_interval = config.detection.poll_interval();

        if config.obs.url() != self.ctx.config.obs.url()
            || config.obs.password != self.ctx.config.obs.password
            || config.api.port != self.ctx.config.api.port
        {
            warn!("[obs] connection and [api] port changes take effect after a restart");
        }

        self.ctx.config = config;
        Ok(())
    }

    async fn shutdown(&mut self) {
        self.ctx.shutdown.cancel();
        self.ctx.client.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obs::{ObsError, ObsEvent, SceneItem};
    use crate::recorder::RecordingOrigin;
    use crate::sources::SourcesHealth;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeEngine {
        recording: AtomicBool,
    }

    #[async_trait]
    impl RecordingEngine for FakeEngine {
        fn is_connected(&self) -> bool {
            true
        }

        async fn start_recording(&self) -> Result<(), ObsError> {
            self.recording.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn stop_recording(&self) -> Result<(), ObsError> {
            self.recording.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn recording_active(&self) -> Result<bool, ObsError> {
            Ok(self.recording.load(Ordering::SeqCst))
        }
    }

    /// Scene whose input creation can be refused or made to hang.
    #[derive(Default)]
    struct FakeScene {
        items: Mutex<Vec<SceneItem>>,
        creates: AtomicUsize,
        refuse_create: AtomicBool,
        hang: AtomicBool,
    }

    impl FakeScene {
        fn add_item(&self, name: &str) {
            let mut items = self.items.lock().unwrap();
            let id = items.len() as i64 + 1;
            items.push(SceneItem {
                scene_item_id: id,
                source_name: name.to_string(),
                scene_item_enabled: true,
                input_kind: None,
            });
        }
    }

    #[async_trait]
    impl SceneControl for FakeScene {
        async fn current_scene(&self) -> Result<String, ObsError> {
            if self.hang.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            Ok("Scene".to_string())
        }

        async fn scene_items(&self, _scene_name: &str) -> Result<Vec<SceneItem>, ObsError> {
            Ok(self.items.lock().unwrap().clone())
        }

        async fn create_input(
            &self,
            _scene_name: &str,
            input_name: &str,
            _input_kind: &str,
        ) -> Result<i64, ObsError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            if self.refuse_create.load(Ordering::SeqCst) {
                return Err(ObsError::ProcessingFailed {
                    request_type: "CreateInput".to_string(),
                    code: 702,
                    comment: "capture device busy".to_string(),
                });
            }
            self.add_item(input_name);
            Ok(self.items.lock().unwrap().len() as i64)
        }

        async fn set_item_enabled(
            &self,
            _scene_name: &str,
            _scene_item_id: i64,
            _enabled: bool,
        ) -> Result<(), ObsError> {
            Ok(())
        }
    }

    struct IdleProbe;

    impl SystemProbe for IdleProbe {
        fn snapshot(&mut self) -> Result<SystemSnapshot> {
            Ok(SystemSnapshot::new(Vec::new(), Vec::new(), Utc::now()))
        }
    }

    fn fake_daemon(
        config: Config,
        engine: Arc<FakeEngine>,
        scene: Arc<FakeScene>,
    ) -> (Daemon, mpsc::UnboundedSender<EngineNotification>) {
        let ctx = DaemonContext::build(PathBuf::from("/tmp/meetrec-test.toml"), config).unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        let daemon =
            Daemon::with_backends(ctx, rx, engine, scene, Box::new(IdleProbe)).unwrap();
        (daemon, tx)
    }

    fn quick_sources(config: &mut Config) {
        config.sources.create_attempts = 1;
        config.sources.recovery_interval_seconds = 10;
        config.sources.recovery_window_seconds = 20;
    }

    #[tokio::test]
    async fn test_connected_notification_resyncs_and_reconciles_in_one_tick() {
        let engine = Arc::new(FakeEngine::default());
        let scene = Arc::new(FakeScene::default());
        let (mut daemon, tx) = fake_daemon(Config::default(), engine.clone(), scene.clone());

        // first pass runs before OBS starts recording on its own
        daemon.tick(Instant::now()).await;
        assert_eq!(daemon.reconciler.health(), SourcesHealth::Ready);
        assert_eq!(scene.creates.load(Ordering::SeqCst), 2);
        assert!(daemon.machine.session().is_none());

        engine.recording.store(true, Ordering::SeqCst);
        scene.items.lock().unwrap().clear();
        tx.send(EngineNotification::Connected).unwrap();
        daemon.tick(Instant::now()).await;

        let session = daemon.machine.session().unwrap();
        assert_eq!(session.origin, RecordingOrigin::Forced);
        assert_eq!(scene.creates.load(Ordering::SeqCst), 4);

        let status = daemon.ctx.status.get().await;
        assert!(status.obs_connected);
        assert_eq!(status.sources_state, SourcesHealth::Ready);
        assert!(status.session.is_some());
    }

    #[tokio::test]
    async fn test_scene_edit_rearms_disabled_sources() {
        let mut config = Config::default();
        quick_sources(&mut config);
        let engine = Arc::new(FakeEngine::default());
        let scene = Arc::new(FakeScene::default());
        scene.refuse_create.store(true, Ordering::SeqCst);
        let (mut daemon, tx) = fake_daemon(config, engine, scene.clone());

        let t0 = Instant::now();
        daemon.tick(t0).await;
        assert_eq!(daemon.reconciler.health(), SourcesHealth::Recovering);
        daemon.tick(t0 + Duration::from_secs(10)).await;
        assert_eq!(daemon.reconciler.health(), SourcesHealth::Recovering);
        daemon.tick(t0 + Duration::from_secs(20)).await;
        assert_eq!(daemon.reconciler.health(), SourcesHealth::Disabled);

        let attempts = scene.creates.load(Ordering::SeqCst);
        daemon.tick(t0 + Duration::from_secs(40)).await;
        assert_eq!(scene.creates.load(Ordering::SeqCst), attempts);

        // the operator adds both sources in OBS by hand
        scene.add_item("Meeting Audio");
        scene.add_item("Meeting Display");
        let created = ObsEvent::SceneItemCreated {
            scene_name: "Scene".to_string(),
            source_name: "Meeting Display".to_string(),
            scene_item_id: 2,
        };
        tx.send(EngineNotification::from_event(&created).unwrap()).unwrap();

        daemon.tick(t0 + Duration::from_secs(41)).await;
        assert_eq!(daemon.reconciler.health(), SourcesHealth::Ready);
        assert!(daemon.reconciler.is_armed());
        assert_eq!(scene.creates.load(Ordering::SeqCst), attempts);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_hanging_tick() {
        let mut config = Config::default();
        config.detection.poll_interval_seconds = 1;
        let engine = Arc::new(FakeEngine::default());
        let scene = Arc::new(FakeScene::default());
        scene.hang.store(true, Ordering::SeqCst);
        let (mut daemon, _tx) = fake_daemon(config, engine, scene);

        let shutdown = daemon.ctx.shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            shutdown.cancel();
        });

        tokio::time::timeout(Duration::from_secs(2), daemon.run())
            .await
            .expect("daemon kept running after shutdown");
    }

    #[test]
    fn test_notification_mapping() {
        assert_eq!(
            notification_for(&ClientEvent::Connected { rpc_version: 1 }),
            Some(EngineNotification::Connected)
        );
        assert_eq!(
            notification_for(&ClientEvent::Engine(ObsEvent::InputRemoved {
                input_name: "Meeting Audio".to_string()
            })),
            Some(EngineNotification::ScenesChanged)
        );
        assert_eq!(
            notification_for(&ClientEvent::Engine(ObsEvent::Other {
                event_type: "VendorEvent".to_string(),
                data: None
            })),
            None
        );
    }

    #[tokio::test]
    async fn test_context_builds_from_defaults() {
        let ctx = DaemonContext::build(PathBuf::from("/tmp/meetrec-test.toml"), Config::default())
            .unwrap();
        assert!(!ctx.client.is_ready());
        assert_eq!(ctx.commands.take(), None);
        assert!(!ctx.shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_reload_applies_thresholds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.save_to(&path).unwrap();

        let ctx = DaemonContext::build(path.clone(), config.clone()).unwrap();
        let (_tx, rx) = mpsc::unbounded_channel();
        let mut daemon = Daemon::new(ctx, rx).unwrap();

        config.detection.start_threshold = 7;
        config.detection.poll_interval_seconds = 5;
        config.save_to(&path).unwrap();

        daemon.reload();
        assert_eq!(daemon.machine.settings().start_threshold, 7);
        assert_eq!(daemon.poll_interval, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_invalid_reload_keeps_previous_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config::default();
        config.save_to(&path).unwrap();

        let ctx = DaemonContext::build(path.clone(), config).unwrap();
        let (_tx, rx) = mpsc::unbounded_channel();
        let mut daemon = Daemon::new(ctx, rx).unwrap();

        std::fs::write(&path, "[detection]\nstart_threshold = 0\n").unwrap();
        daemon.reload();
        assert_eq!(daemon.machine.settings().start_threshold, 3);
    }

    #[tokio::test]
    async fn test_quit_command_ends_loop() {
        let ctx = DaemonContext::build(PathBuf::from("/tmp/meetrec-test.toml"), Config::default())
            .unwrap();
        let (_tx, rx) = mpsc::unbounded_channel();
        let mut daemon = Daemon::new(ctx, rx).unwrap();
        daemon.ctx.commands.put(DaemonCommand::Quit);
        assert!(matches!(daemon.tick(Instant::now()).await, Flow::Quit));
    }
}
