//! Rebuild loop for development mode.
//!
//! A [`WatchLoop`] owns the site builder and consumes [`WatchCommand`]s from
//! the file watcher and the dev server. Bursts of file events are collapsed
//! by a quiet period. Requests that arrive while a build runs stay queued and
//! are coalesced into the next build, so the output always settles on the
//! latest sources.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use chrono::Utc;
use color_eyre::eyre::{Result, WrapErr};
use inkpress_core::Config;
use inkpress_generator::{
    BuildReport, BuiltinResolver, Pipeline,
    hooks::{AFTER_RENDER, DEV_RELOAD, HookContext, HookValue},
};
use notify::{
    EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    event::{CreateKind, ModifyKind, RemoveKind},
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::server::inject_livereload;

/// Hook registrations made by the dev server use this plugin id.
pub const DEV_SERVER_PLUGIN: &str = "dev-server";

/// What happened to a watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Add,
    Change,
    Unlink,
    AddDir,
    UnlinkDir,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Change => "change",
            Self::Unlink => "unlink",
            Self::AddDir => "addDir",
            Self::UnlinkDir => "unlinkDir",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Input to the watch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchCommand {
    /// A watched file or directory changed.
    Change(ChangeEvent),
    /// Manual rebuild request.
    Rebuild,
    /// Drop cached templates before the next build.
    ClearCache,
}

/// Lifecycle event broadcast to every dev client.
#[derive(Debug, Clone, PartialEq)]
pub enum DevEvent {
    BuildStart {
        trigger: String,
        path: Option<String>,
    },
    BuildComplete {
        trigger: String,
        path: Option<String>,
        build_time_ms: u64,
        timestamp: String,
    },
    BuildError {
        trigger: String,
        path: Option<String>,
        message: String,
    },
    Reload,
}

impl DevEvent {
    /// Event name on the live-reload channel.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BuildStart { .. } => "build:start",
            Self::BuildComplete { .. } => "build:complete",
            Self::BuildError { .. } => "build:error",
            Self::Reload => "reload",
        }
    }

    /// Event payload.
    pub fn data(&self) -> Value {
        match self {
            Self::BuildStart { trigger, path } => json!({ "trigger": trigger, "path": path }),
            Self::BuildComplete {
                trigger,
                path,
                build_time_ms,
                timestamp,
            } => json!({
                "trigger": trigger,
                "path": path,
                "buildTimeMs": build_time_ms,
                "timestamp": timestamp,
            }),
            Self::BuildError {
                trigger,
                path,
                message,
            } => json!({ "trigger": trigger, "path": path, "message": message }),
            Self::Reload => json!({}),
        }
    }
}

/// Outcome of the most recent build.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastBuild {
    pub ok: bool,
    pub trigger: String,
    pub build_time_ms: u64,
    pub timestamp: String,
    pub message: Option<String>,
    pub report: Option<BuildReport>,
}

/// Shared view of the loop, served by the status endpoint.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DevStatus {
    pub building: bool,
    pub builds: u64,
    pub last_build: Option<LastBuild>,
}

/// The part of the site the watch loop drives. Calls never overlap.
pub trait SiteBuilder: Send + 'static {
    fn build(&mut self) -> Result<BuildReport>;

    /// Re-read configuration from disk, keeping the old one on error.
    fn reload_config(&mut self) -> Result<()>;

    fn clear_cache(&mut self);

    fn is_config_file(&self, path: &Path) -> bool;

    /// Whether clients should refresh after a successful build.
    fn live_reload(&self) -> bool {
        true
    }

    /// Called after a successful build, before clients are told to reload.
    fn after_build(&mut self) {}
}

/// A build request waiting for the quiet period to end.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingBuild {
    trigger: String,
    path: Option<PathBuf>,
    reload_config: bool,
}

/// Serialized, debounced rebuild loop.
pub struct WatchLoop<B> {
    builder: Arc<Mutex<B>>,
    commands: mpsc::Receiver<WatchCommand>,
    events: broadcast::Sender<DevEvent>,
    status: Arc<RwLock<DevStatus>>,
    debounce: Duration,
}

impl<B: SiteBuilder> WatchLoop<B> {
    pub fn new(
        builder: B,
        commands: mpsc::Receiver<WatchCommand>,
        events: broadcast::Sender<DevEvent>,
        debounce: Duration,
    ) -> Self {
        Self {
            builder: Arc::new(Mutex::new(builder)),
            commands,
            events,
            status: Arc::new(RwLock::new(DevStatus::default())),
            debounce,
        }
    }

    pub fn status(&self) -> Arc<RwLock<DevStatus>> {
        self.status.clone()
    }

    /// Process commands until every sender is dropped.
    pub async fn run(mut self) {
        let mut pending: Option<PendingBuild> = None;
        let mut open = true;

        while open {
            if pending.is_none() {
                match self.commands.recv().await {
                    Some(command) => self.accept(command, &mut pending),
                    None => break,
                }
            }

            // Quiet period: keep absorbing commands until none arrive for
            // `debounce`.
            loop {
                match tokio::time::timeout(self.debounce, self.commands.recv()).await {
                    Ok(Some(command)) => self.accept(command, &mut pending),
                    Ok(None) => {
                        open = false;
                        break;
                    }
                    Err(_) => break,
                }
            }

            if let Some(request) = pending.take() {
                self.rebuild(request).await;
            }
        }

        debug!("watch loop stopped");
    }

    fn accept(&self, command: WatchCommand, pending: &mut Option<PendingBuild>) {
        debug!(?command, "watch command");
        let reload_config = pending.as_ref().is_some_and(|p| p.reload_config);

        match command {
            WatchCommand::Change(event) => {
                let is_config = self.builder.lock().is_config_file(&event.path);
                *pending = Some(PendingBuild {
                    trigger: event.kind.as_str().to_string(),
                    path: Some(event.path),
                    reload_config: reload_config || is_config,
                });
            }
            WatchCommand::Rebuild => {
                *pending = Some(PendingBuild {
                    trigger: "manual".to_string(),
                    path: None,
                    reload_config,
                });
            }
            WatchCommand::ClearCache => {
                self.builder.lock().clear_cache();
                info!("template cache cleared");
            }
        }
    }

    async fn rebuild(&self, request: PendingBuild) {
        let trigger = request.trigger.clone();
        let path = request.path.as_ref().map(|p| p.display().to_string());
        info!(trigger = %trigger, path = ?path, "rebuilding");

        self.status.write().building = true;
        self.publish(DevEvent::BuildStart {
            trigger: trigger.clone(),
            path: path.clone(),
        });

        let builder = self.builder.clone();
        let reload_config = request.reload_config;
        let outcome = tokio::task::spawn_blocking(move || {
            let mut builder = builder.lock();
            if reload_config {
                builder.reload_config().wrap_err("Failed to reload configuration")?;
                info!("configuration reloaded");
            }
            let report = builder.build()?;
            builder.after_build();
            Ok::<_, color_eyre::Report>((report, builder.live_reload()))
        })
        .await
        .wrap_err("Build task panicked")
        .and_then(|result| result);

        let timestamp = Utc::now().to_rfc3339();
        let mut status = self.status.write();
        status.building = false;
        status.builds += 1;

        match outcome {
            Ok((report, live_reload)) => {
                info!(elapsed_ms = report.elapsed_ms, "rebuild complete");
                status.last_build = Some(LastBuild {
                    ok: true,
                    trigger: trigger.clone(),
                    build_time_ms: report.elapsed_ms,
                    timestamp: timestamp.clone(),
                    message: None,
                    report: Some(report.clone()),
                });
                drop(status);

                self.publish(DevEvent::BuildComplete {
                    trigger,
                    path,
                    build_time_ms: report.elapsed_ms,
                    timestamp,
                });
                if live_reload {
                    self.publish(DevEvent::Reload);
                }
            }
            Err(e) => {
                let message = error_message(&e);
                error!(error = %message, "rebuild failed");
                status.last_build = Some(LastBuild {
                    ok: false,
                    trigger: trigger.clone(),
                    build_time_ms: 0,
                    timestamp,
                    message: Some(message.clone()),
                    report: None,
                });
                drop(status);

                self.publish(DevEvent::BuildError {
                    trigger,
                    path,
                    message,
                });
            }
        }
    }

    fn publish(&self, event: DevEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Full error chain on one line.
pub fn error_message(err: &color_eyre::Report) -> String {
    err.chain()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ")
}

/// Translate a raw watcher event into change events.
pub fn change_events(event: &notify::Event) -> Vec<ChangeEvent> {
    let kind = match event.kind {
        EventKind::Create(CreateKind::Folder) => ChangeKind::AddDir,
        EventKind::Create(_) => ChangeKind::Add,
        EventKind::Remove(RemoveKind::Folder) => ChangeKind::UnlinkDir,
        EventKind::Remove(_) => ChangeKind::Unlink,
        EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(_) => ChangeKind::Change,
        EventKind::Access(_) | EventKind::Other | EventKind::Any => return Vec::new(),
    };

    event
        .paths
        .iter()
        .map(|path| ChangeEvent::new(kind, path.clone()))
        .collect()
}

/// Source directories the dev loop reacts to. Missing ones are skipped.
pub fn source_dirs(config: &Config) -> Vec<PathBuf> {
    [config.content_dir(), config.templates_dir(), config.public_dir()]
        .into_iter()
        .filter(|dir| dir.is_dir())
        .collect()
}

/// File watcher over the site sources and the configuration file.
///
/// Events are forwarded as [`WatchCommand::Change`]. The watched set follows
/// configuration reloads through [`SourceWatcher::update`].
pub struct SourceWatcher {
    watcher: RecommendedWatcher,
    dirs: Arc<RwLock<Vec<PathBuf>>>,
}

impl SourceWatcher {
    pub fn spawn(
        config: &Config,
        config_file: &Path,
        commands: mpsc::Sender<WatchCommand>,
    ) -> Result<Self> {
        let config_file = std::path::absolute(config_file)?;
        let dirs = Arc::new(RwLock::new(Vec::new()));

        let filter_dirs = dirs.clone();
        let filter_file = config_file.clone();
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    for change in change_events(&event) {
                        let relevant = change.path == filter_file
                            || filter_dirs.read().iter().any(|dir| change.path.starts_with(dir));
                        if relevant {
                            let _ = commands.blocking_send(WatchCommand::Change(change));
                        }
                    }
                }
                Err(e) => warn!(error = %e, "file watcher error"),
            },
            notify::Config::default(),
        )
        .wrap_err("Failed to create file watcher")?;

        let mut source = Self { watcher, dirs };

        // Editors often replace the file, so watch its directory and filter.
        if let Some(parent) = config_file.parent() {
            source
                .watcher
                .watch(parent, RecursiveMode::NonRecursive)
                .wrap_err("Failed to watch configuration file")?;
        }

        source.update(config)?;
        Ok(source)
    }

    /// Watch the source directories of `config`, dropping the ones it no
    /// longer names.
    pub fn update(&mut self, config: &Config) -> Result<()> {
        let wanted = source_dirs(config);
        let current = self.dirs.read().clone();

        for dir in current.iter().filter(|dir| !wanted.contains(dir)) {
            if let Err(e) = self.watcher.unwatch(dir) {
                debug!(dir = %dir.display(), error = %e, "unwatch failed");
            }
            info!(dir = %dir.display(), "stopped watching");
        }
        for dir in wanted.iter().filter(|dir| !current.contains(dir)) {
            self.watcher
                .watch(dir, RecursiveMode::Recursive)
                .wrap_err_with(|| format!("Failed to watch {}", dir.display()))?;
            debug!(dir = %dir.display(), "watching");
        }

        *self.dirs.write() = wanted;
        Ok(())
    }

    pub fn dirs(&self) -> Vec<PathBuf> {
        self.dirs.read().clone()
    }
}

impl std::fmt::Debug for SourceWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceWatcher")
            .field("dirs", &*self.dirs.read())
            .finish_non_exhaustive()
    }
}

/// Load configuration the way dev mode needs it.
pub fn load_dev_config(config_file: &Path) -> Result<Config> {
    let mut config =
        Config::load_with_env(config_file).wrap_err("Failed to load configuration")?;
    config.build.drafts = true;
    config.build.template_cache = false;
    Ok(config)
}

/// The real site: a pipeline rebuilt from scratch whenever configuration
/// changes.
#[derive(Debug)]
pub struct DevSite {
    config_file: PathBuf,
    pipeline: Pipeline,
    watcher: Option<SourceWatcher>,
}

impl DevSite {
    pub fn new(config_file: &Path, config: Config) -> Result<Self> {
        Ok(Self {
            config_file: std::path::absolute(config_file)?,
            pipeline: dev_pipeline(config),
            watcher: None,
        })
    }

    /// Keep `watcher` in step with configuration reloads.
    pub fn with_watcher(mut self, watcher: SourceWatcher) -> Self {
        self.watcher = Some(watcher);
        self
    }

    pub fn watcher(&self) -> Option<&SourceWatcher> {
        self.watcher.as_ref()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

fn dev_pipeline(config: Config) -> Pipeline {
    let live_reload = config.dev.live_reload;
    let pipeline = Pipeline::new(Arc::new(config), Arc::new(BuiltinResolver::new()));

    if live_reload {
        pipeline.hooks().on(AFTER_RENDER, DEV_SERVER_PLUGIN, |value, _| {
            Ok(match value {
                HookValue::Html(html) => Some(HookValue::Html(inject_livereload(html))),
                _ => None,
            })
        });
    }

    pipeline
}

impl SiteBuilder for DevSite {
    fn build(&mut self) -> Result<BuildReport> {
        self.pipeline.build().wrap_err("Build failed")
    }

    fn reload_config(&mut self) -> Result<()> {
        let config = load_dev_config(&self.config_file)?;
        if let Some(watcher) = &mut self.watcher {
            watcher.update(&config)?;
        }

        let previous = self.pipeline.config().output_dir();
        if config.output_dir() != previous {
            warn!(
                serving = %previous.display(),
                output = %config.output_dir().display(),
                "output directory changed, restart the dev server to serve it"
            );
        }

        self.pipeline.plugins().unload_all();
        self.pipeline = dev_pipeline(config);
        Ok(())
    }

    fn clear_cache(&mut self) {
        self.pipeline.clear_cache();
    }

    fn is_config_file(&self, path: &Path) -> bool {
        std::path::absolute(path).is_ok_and(|p| p == self.config_file)
    }

    fn live_reload(&self) -> bool {
        self.pipeline.config().dev.live_reload
    }

    fn after_build(&mut self) {
        let config = self.pipeline.config().clone();
        self.pipeline
            .hooks()
            .invoke(HookValue::None, &HookContext::new(DEV_RELOAD, &config));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use color_eyre::eyre::eyre;
    use tempfile::TempDir;

    use super::*;

    #[derive(Default)]
    struct Counts {
        builds: AtomicUsize,
        reloads: AtomicUsize,
        clears: AtomicUsize,
    }

    struct FakeSite {
        counts: Arc<Counts>,
        fail: bool,
        started: Option<mpsc::UnboundedSender<()>>,
        release: Option<std::sync::mpsc::Receiver<()>>,
    }

    impl FakeSite {
        fn new(counts: Arc<Counts>) -> Self {
            Self {
                counts,
                fail: false,
                started: None,
                release: None,
            }
        }
    }

    impl SiteBuilder for FakeSite {
        fn build(&mut self) -> Result<BuildReport> {
            if let Some(started) = &self.started {
                let _ = started.send(());
            }
            if let Some(release) = &self.release {
                let _ = release.recv_timeout(Duration::from_secs(5));
            }
            self.counts.builds.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(eyre!("template 'post' not found"));
            }
            Ok(BuildReport::default())
        }

        fn reload_config(&mut self) -> Result<()> {
            self.counts.reloads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn clear_cache(&mut self) {
            self.counts.clears.fetch_add(1, Ordering::SeqCst);
        }

        fn is_config_file(&self, path: &Path) -> bool {
            path.ends_with("inkpress.toml")
        }
    }

    fn change(path: &str) -> WatchCommand {
        WatchCommand::Change(ChangeEvent::new(ChangeKind::Change, path))
    }

    fn drain(rx: &mut broadcast::Receiver<DevEvent>) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        names
    }

    #[tokio::test]
    async fn test_burst_triggers_one_rebuild() {
        let counts = Arc::new(Counts::default());
        let (tx, rx) = mpsc::channel(16);
        let (events, mut events_rx) = broadcast::channel(16);
        let site = FakeSite::new(counts.clone());
        let watch = WatchLoop::new(site, rx, events, Duration::from_millis(50));
        let status = watch.status();

        for _ in 0..3 {
            tx.send(change("content/posts/hello.md")).await.expect("send");
        }
        drop(tx);
        watch.run().await;

        assert_eq!(counts.builds.load(Ordering::SeqCst), 1);
        assert_eq!(counts.reloads.load(Ordering::SeqCst), 0);
        assert_eq!(drain(&mut events_rx), vec!["build:start", "build:complete", "reload"]);
        assert_eq!(status.read().builds, 1);
        assert!(!status.read().building);
    }

    #[tokio::test]
    async fn test_change_during_build_is_queued() {
        let counts = Arc::new(Counts::default());
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let mut site = FakeSite::new(counts.clone());
        site.started = Some(started_tx);
        site.release = Some(release_rx);

        let (tx, rx) = mpsc::channel(16);
        let (events, _) = broadcast::channel(16);
        let watch = WatchLoop::new(site, rx, events, Duration::from_millis(10));
        let handle = tokio::spawn(watch.run());

        tx.send(change("content/a.md")).await.expect("send");
        started_rx.recv().await.expect("first build started");

        // Arrives while the first build is blocked.
        tx.send(change("content/b.md")).await.expect("send");
        tx.send(change("content/c.md")).await.expect("send");
        release_tx.send(()).expect("release first");

        started_rx.recv().await.expect("second build started");
        release_tx.send(()).expect("release second");
        drop(tx);
        handle.await.expect("loop");

        assert_eq!(counts.builds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_config_change_reloads_before_build() {
        let counts = Arc::new(Counts::default());
        let (tx, rx) = mpsc::channel(16);
        let (events, _) = broadcast::channel(16);
        let site = FakeSite::new(counts.clone());
        let watch = WatchLoop::new(site, rx, events, Duration::from_millis(20));

        tx.send(change("/site/inkpress.toml")).await.expect("send");
        tx.send(change("/site/content/a.md")).await.expect("send");
        drop(tx);
        watch.run().await;

        assert_eq!(counts.reloads.load(Ordering::SeqCst), 1);
        assert_eq!(counts.builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_build_reports_error_without_reload() {
        let counts = Arc::new(Counts::default());
        let mut site = FakeSite::new(counts.clone());
        site.fail = true;
        let (tx, rx) = mpsc::channel(16);
        let (events, mut events_rx) = broadcast::channel(16);
        let watch = WatchLoop::new(site, rx, events, Duration::from_millis(10));
        let status = watch.status();

        tx.send(WatchCommand::Rebuild).await.expect("send");
        drop(tx);
        watch.run().await;

        let mut received = Vec::new();
        while let Ok(event) = events_rx.try_recv() {
            received.push(event);
        }
        assert_eq!(received.len(), 2);
        match &received[1] {
            DevEvent::BuildError { trigger, message, .. } => {
                assert_eq!(trigger, "manual");
                assert!(message.contains("template 'post' not found"));
            }
            other => panic!("unexpected event {other:?}"),
        }
        let last = status.read().last_build.clone().expect("last build");
        assert!(!last.ok);
    }

    #[tokio::test]
    async fn test_clear_cache_does_not_build() {
        let counts = Arc::new(Counts::default());
        let (tx, rx) = mpsc::channel(16);
        let (events, _) = broadcast::channel(16);
        let site = FakeSite::new(counts.clone());
        let watch = WatchLoop::new(site, rx, events, Duration::from_millis(10));

        tx.send(WatchCommand::ClearCache).await.expect("send");
        drop(tx);
        watch.run().await;

        assert_eq!(counts.clears.load(Ordering::SeqCst), 1);
        assert_eq!(counts.builds.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_change_events_mapping() {
        let event = notify::Event::new(EventKind::Create(CreateKind::Folder)).add_path("/a".into());
        assert_eq!(change_events(&event), vec![ChangeEvent::new(ChangeKind::AddDir, "/a")]);

        let event =
            notify::Event::new(EventKind::Remove(RemoveKind::File)).add_path("/b.md".into());
        assert_eq!(change_events(&event)[0].kind, ChangeKind::Unlink);

        let event = notify::Event::new(EventKind::Modify(ModifyKind::Data(
            notify::event::DataChange::Content,
        )))
        .add_path("/c.md".into());
        assert_eq!(change_events(&event)[0].kind, ChangeKind::Change);

        let event = notify::Event::new(EventKind::Access(notify::event::AccessKind::Any))
            .add_path("/d.md".into());
        assert!(change_events(&event).is_empty());
    }

    #[test]
    fn test_event_payloads() {
        let event = DevEvent::BuildComplete {
            trigger: "change".into(),
            path: Some("content/a.md".into()),
            build_time_ms: 12,
            timestamp: "t".into(),
        };
        assert_eq!(event.name(), "build:complete");
        assert_eq!(event.data()["buildTimeMs"], 12);
        assert_eq!(DevEvent::Reload.data(), json!({}));
    }

    #[test]
    fn test_dev_site_builds_with_livereload() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path();
        std::fs::write(root.join("inkpress.toml"), "[site]\ntitle = \"Dev\"\n").expect("config");
        std::fs::create_dir_all(root.join("templates")).expect("templates");
        std::fs::write(root.join("templates/index.html"), "<html><body>home</body></html>")
            .expect("index");
        std::fs::create_dir_all(root.join("content")).expect("content");

        let config_file = root.join("inkpress.toml");
        let mut site = DevSite::new(&config_file, load_dev_config(&config_file).expect("load"))
            .expect("site");
        assert!(site.is_config_file(&config_file));
        assert!(!site.is_config_file(&root.join("content/a.md")));

        site.build().expect("build");
        let html = std::fs::read_to_string(root.join("dist/index.html")).expect("home");
        assert!(html.contains("/__livereload"));
        assert!(html.ends_with("</body></html>"));

        std::fs::write(
            root.join("inkpress.toml"),
            "[site]\ntitle = \"Dev\"\n\n[dev]\nlive_reload = false\n",
        )
        .expect("rewrite");
        site.reload_config().expect("reload");
        assert!(!site.live_reload());
    }

    #[test]
    fn test_dev_site_renders_edited_templates() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path();
        std::fs::write(root.join("inkpress.toml"), "[site]\ntitle = \"Dev\"\n").expect("config");
        std::fs::create_dir_all(root.join("templates")).expect("templates");
        std::fs::create_dir_all(root.join("content")).expect("content");
        std::fs::write(root.join("templates/index.html"), "version-one").expect("index");

        let config_file = root.join("inkpress.toml");
        let config = load_dev_config(&config_file).expect("load");
        assert!(!config.build.template_cache);
        let mut site = DevSite::new(&config_file, config).expect("site");

        site.build().expect("first build");
        let html = std::fs::read_to_string(root.join("dist/index.html")).expect("home");
        assert!(html.starts_with("version-one"));

        std::fs::write(root.join("templates/index.html"), "version-two").expect("edit");
        site.build().expect("second build");
        let html = std::fs::read_to_string(root.join("dist/index.html")).expect("home");
        assert!(html.starts_with("version-two"), "stale template: {html}");
    }

    #[test]
    fn test_config_reload_moves_watched_dirs() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path();
        std::fs::write(root.join("inkpress.toml"), "[site]\ntitle = \"Dev\"\n").expect("config");
        for sub in ["content", "templates", "notes"] {
            std::fs::create_dir_all(root.join(sub)).expect("mkdir");
        }

        let config_file = root.join("inkpress.toml");
        let config = load_dev_config(&config_file).expect("load");
        let (tx, _rx) = mpsc::channel(1024);
        let watcher = SourceWatcher::spawn(&config, &config_file, tx).expect("watcher");
        assert!(watcher.dirs().iter().any(|d| d.ends_with("content")));

        let mut site = DevSite::new(&config_file, config).expect("site").with_watcher(watcher);
        std::fs::write(
            root.join("inkpress.toml"),
            "[site]\ntitle = \"Dev\"\n\n[paths]\ncontent = \"notes\"\n",
        )
        .expect("rewrite");
        site.reload_config().expect("reload");

        let dirs = site.watcher().expect("watcher").dirs();
        assert!(dirs.iter().any(|d| d.ends_with("notes")));
        assert!(!dirs.iter().any(|d| d.ends_with("content")));
        assert!(dirs.iter().any(|d| d.ends_with("templates")));
        assert_eq!(site.pipeline().config().content_dir(), root.join("notes"));
    }
}
