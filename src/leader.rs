//! The leader core: owns the authoritative configuration and the app
//! graph derived from it, serves config RPCs on the control socket, and
//! fans the resulting action stream out to every follower.

use crate::action;
use crate::follower::Follower;
use crate::graph::{compute_config_actions, AppGraph};
use crate::rpc::{arg_str, error_reply, ok_reply, parse_request, Peer, PeerState, Request};
use anyhow::{bail, Context, Result};
use serde_json::json;
use std::os::unix::net::UnixListener;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use weir_config::{
    add_config, get_config, parse_value, remove_config, set_config, Path, Registry, Schema, Value,
};

/// The user hook that turns a configuration into an app graph. Must be
/// pure: the leader re-runs it on every accepted mutation and diffs the
/// result against the previous graph.
pub type SetupFn = Box<dyn Fn(&Value) -> Result<AppGraph> + Send>;

/// Constructor options for [`Leader`].
pub struct LeaderOptions {
    /// Control socket path; relative names land in this process's shm
    /// directory.
    pub socket_file_name: String,
    /// Name of the registered schema configurations must conform to.
    pub schema_name: String,
    /// Seed configuration, in printed form.
    pub initial_configuration: String,
    /// Configuration-to-graph hook.
    pub setup_fn: SetupFn,
    /// Worker pids to ship actions to.
    pub follower_pids: Vec<u32>,
    /// Tick frequency.
    pub hz: u32,
}

impl LeaderOptions {
    /// Options with the default socket name and tick rate.
    pub fn new(
        schema_name: impl Into<String>,
        initial_configuration: impl Into<String>,
        setup_fn: SetupFn,
    ) -> Self {
        Self {
            socket_file_name: "config-leader-socket".to_string(),
            schema_name: schema_name.into(),
            initial_configuration: initial_configuration.into(),
            setup_fn,
            follower_pids: Vec::new(),
            hz: 100,
        }
    }

    /// Sets the follower pids.
    pub fn followers(mut self, pids: Vec<u32>) -> Self {
        self.follower_pids = pids;
        self
    }

    /// Sets the control socket name or path.
    pub fn socket(mut self, name: impl Into<String>) -> Self {
        self.socket_file_name = name.into();
        self
    }

    /// Sets the tick frequency.
    pub fn hz(mut self, hz: u32) -> Self {
        self.hz = hz;
        self
    }
}

enum MutateOp {
    Set,
    Add,
    Remove,
}

/// The control-plane leader.
pub struct Leader {
    schema: Arc<Schema>,
    current_configuration: Value,
    current_app_graph: AppGraph,
    setup_fn: SetupFn,
    peers: Vec<Peer>,
    followers: Vec<Follower>,
    socket: Option<UnixListener>,
    socket_path: PathBuf,
    period: Duration,
    next_time: Instant,
}

impl Leader {
    /// Boots a leader: resolves the schema, validates the seed
    /// configuration, computes the initial graph, and binds the control
    /// socket. Failure here aborts construction; once up, errors only ever
    /// tear down individual peers.
    pub fn new(options: LeaderOptions) -> Result<Self> {
        // dead peers surface as write errors, not signals
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_IGN);
        }
        let schema = Registry::global()
            .lookup(&options.schema_name)
            .with_context(|| format!("unknown schema {}", options.schema_name))?;
        let current_configuration =
            parse_value(schema.grammar(), &options.initial_configuration)
                .context("initial configuration")?;
        let current_app_graph =
            (options.setup_fn)(&current_configuration).context("initial setup")?;

        let socket_path = weir_shm::resolve(&options.socket_file_name);
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        // unlink-then-bind so a stale socket from a dead leader does not
        // block startup
        std::fs::remove_file(&socket_path).ok();
        let socket = UnixListener::bind(&socket_path)
            .with_context(|| format!("binding {}", socket_path.display()))?;
        socket
            .set_nonblocking(true)
            .context("setting control socket non-blocking")?;
        tracing::info!(socket = %socket_path.display(), schema = %schema.name(), "leader up");

        Ok(Self {
            schema,
            current_configuration,
            current_app_graph,
            setup_fn: options.setup_fn,
            peers: Vec::new(),
            followers: options.follower_pids.into_iter().map(Follower::new).collect(),
            socket: Some(socket),
            socket_path,
            period: Duration::from_secs(1) / options.hz.max(1),
            next_time: Instant::now(),
        })
    }

    /// The authoritative configuration.
    pub fn configuration(&self) -> &Value {
        &self.current_configuration
    }

    /// The app graph derived from the configuration.
    pub fn app_graph(&self) -> &AppGraph {
        &self.current_app_graph
    }

    /// Where the control socket lives.
    pub fn socket_path(&self) -> &FsPath {
        &self.socket_path
    }

    /// The followers, in construction order.
    pub fn followers(&self) -> &[Follower] {
        &self.followers
    }

    /// The rate-gated tick: runs one serve/ship cycle when the period has
    /// elapsed, otherwise returns immediately. Called once per engine
    /// iteration.
    pub fn pull(&mut self) {
        let now = Instant::now();
        if now < self.next_time {
            return;
        }
        self.next_time = now + self.period;
        self.tick();
    }

    /// One full serve/ship cycle, ungated. Everything in it is bounded by
    /// what the fds allow without blocking.
    pub fn tick(&mut self) {
        self.handle_calls_from_peers();
        self.send_messages_to_followers();
    }

    fn handle_calls_from_peers(&mut self) {
        let socket = match &self.socket {
            Some(socket) => socket,
            None => return,
        };
        loop {
            match socket.accept() {
                Ok((stream, _)) => match Peer::new(stream) {
                    Ok(peer) => self.peers.push(peer),
                    Err(err) => tracing::error!("peer setup failed: {err}"),
                },
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    tracing::error!("accept failed: {err}");
                    break;
                }
            }
        }
        let mut peers = std::mem::take(&mut self.peers);
        for peer in &mut peers {
            peer.serve(&mut |payload| self.dispatch(payload));
            if let PeerState::Error(why) = peer.state() {
                tracing::error!("dropping peer: {why}");
            }
        }
        peers.retain(|peer| !peer.is_finished());
        self.peers = peers;
    }

    fn send_messages_to_followers(&mut self) {
        for follower in &mut self.followers {
            follower.service();
        }
    }

    /// Maps a request payload to a reply payload. RPC and mutator failures
    /// become framed error replies; only framing violations tear a peer
    /// down.
    fn dispatch(&mut self, payload: &[u8]) -> Vec<u8> {
        match self.handle(payload) {
            Ok(result) => ok_reply(result),
            Err(err) => {
                tracing::debug!("rpc failed: {err:#}");
                error_reply(&format!("{err:#}"))
            }
        }
    }

    fn handle(&mut self, payload: &[u8]) -> Result<serde_json::Value> {
        let request = parse_request(payload)?;
        match request.method.as_str() {
            "describe" => Ok(json!({ "native_schema": self.schema.name() })),
            "get-config" => {
                self.check_schema(&request)?;
                let path = Path::parse(arg_str(&request, "path")?)?;
                let config = get_config(&self.schema, &path, &self.current_configuration)?;
                Ok(json!({ "config": config }))
            }
            "set-config" => {
                self.check_schema(&request)?;
                let payload = arg_str(&request, "config")?.to_string();
                self.update_configuration(
                    MutateOp::Set,
                    arg_str(&request, "path")?,
                    Some(&payload),
                )?;
                Ok(json!({}))
            }
            "add-config" => {
                self.check_schema(&request)?;
                let payload = arg_str(&request, "config")?.to_string();
                self.update_configuration(
                    MutateOp::Add,
                    arg_str(&request, "path")?,
                    Some(&payload),
                )?;
                Ok(json!({}))
            }
            "remove-config" => {
                self.check_schema(&request)?;
                self.update_configuration(MutateOp::Remove, arg_str(&request, "path")?, None)?;
                Ok(json!({}))
            }
            method => bail!("unknown method {method}"),
        }
    }

    fn check_schema(&self, request: &Request) -> Result<()> {
        let schema = arg_str(request, "schema")?;
        if schema != self.schema.name() {
            bail!(
                "schema mismatch: leader speaks {}, request names {schema}",
                self.schema.name()
            );
        }
        Ok(())
    }

    /// Applies one mutation end to end. Parsing, mutation and setup all
    /// run against copies; the leader's state is swapped only after every
    /// step has succeeded, so a failure anywhere leaves it untouched.
    fn update_configuration(
        &mut self,
        op: MutateOp,
        path_text: &str,
        payload: Option<&str>,
    ) -> Result<()> {
        let path = Path::parse(path_text)?;
        let mut new_config = self.current_configuration.clone();
        match op {
            MutateOp::Set => {
                let payload = payload.context("set-config needs a payload")?;
                set_config(&self.schema, &path, &mut new_config, payload)?;
            }
            MutateOp::Add => {
                let payload = payload.context("add-config needs a payload")?;
                add_config(&self.schema, &path, &mut new_config, payload)?;
            }
            MutateOp::Remove => remove_config(&self.schema, &path, &mut new_config)?,
        }
        let new_graph = (self.setup_fn)(&new_config).context("setup failed")?;
        let actions = compute_config_actions(&self.current_app_graph, &new_graph);
        tracing::debug!(path = %path, actions = actions.len(), "configuration updated");
        for follower in &mut self.followers {
            for act in &actions {
                follower.enqueue(action::encode(act));
            }
        }
        self.current_configuration = new_config;
        self.current_app_graph = new_graph;
        Ok(())
    }

    /// Tears the leader down: closes every peer and the listening socket,
    /// then unlinks the socket file. Idempotent.
    pub fn stop(&mut self) {
        self.peers.clear();
        if self.socket.take().is_some() {
            std::fs::remove_file(&self.socket_path).ok();
            tracing::info!(socket = %self.socket_path.display(), "leader down");
        }
    }
}

impl Drop for Leader {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Leader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Leader")
            .field("schema", &self.schema.name())
            .field("socket", &self.socket_path)
            .field("peers", &self.peers.len())
            .field("followers", &self.followers.len())
            .finish_non_exhaustive()
    }
}
