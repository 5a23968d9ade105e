//! Prefetch service
//!
//! Runs a [`BufferListScheduler`] inside one tokio task, the only place it is
//! ever mutated. Callers talk to it through a cloneable [`PrefetchHandle`];
//! commands and poll ticks are processed one at a time, so a switch can never
//! interleave with another switch or with a tick.
//!
//! Switch requests that pile up while the task is busy are coalesced: only
//! the latest one is applied, and superseded callers get
//! [`Error::Superseded`].

use bvp_common::events::{EventBus, PrefetchEvent, PrefetchEventKind};
use bvp_common::{EntryId, NodeId, PlayerId};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::buffer_item::{BufferItemInfo, ItemId};
use super::scheduler::BufferListScheduler;
use super::timer::TokioPollTimer;
use crate::config::PrefetchConfig;
use crate::error::{Error, Result};
use crate::graph::NodeGraph;
use crate::player::PlayerProvisioner;
use crate::settings::{PersistedSettings, PlayerSetting};

type Reply<T> = oneshot::Sender<Result<T>>;

/// Commands accepted by the service task
#[derive(Debug)]
enum Command {
    SwitchTo {
        node: Option<NodeId>,
        reply: Option<Reply<Vec<EntryId>>>,
    },
    ApplySetting {
        setting: PlayerSetting,
        origin: Option<PlayerId>,
    },
    Activate {
        entry_id: EntryId,
        reply: Reply<PlayerId>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<BufferItemInfo>>,
    },
    Settings {
        reply: oneshot::Sender<PersistedSettings>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Entry point for starting the scheduler task
pub struct PrefetchService;

impl PrefetchService {
    /// Spawn the scheduler task on the current tokio runtime
    pub fn spawn(
        graph: Arc<NodeGraph>,
        config: PrefetchConfig,
        provisioner: Box<dyn PlayerProvisioner>,
    ) -> Result<(PrefetchHandle, JoinHandle<()>)> {
        let events = EventBus::new(config.event_bus_capacity);
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        let scheduler = BufferListScheduler::new(
            graph,
            config,
            provisioner,
            Box::new(TokioPollTimer::new(tick_tx)),
            events.clone(),
        )?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(scheduler, cmd_rx, tick_rx));
        info!("Prefetch service started");

        Ok((PrefetchHandle { cmd_tx, events }, task))
    }
}

async fn run(
    mut scheduler: BufferListScheduler,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    mut tick_rx: mpsc::UnboundedReceiver<ItemId>,
) {
    let mut backlog: VecDeque<Command> = VecDeque::new();

    loop {
        let command = match backlog.pop_front() {
            Some(command) => command,
            None => tokio::select! {
                biased;
                command = cmd_rx.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
                Some(item) = tick_rx.recv() => {
                    scheduler.on_poll(item);
                    continue;
                }
            },
        };

        match command {
            Command::SwitchTo { node, reply } => {
                let (node, reply) = coalesce_switches(node, reply, &mut cmd_rx, &mut backlog);
                let result = scheduler.switch_to(node.as_ref());
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = result {
                            warn!("Switch request failed: {}", e);
                        }
                    }
                }
            }
            Command::ApplySetting { setting, origin } => {
                scheduler.apply_setting(setting, origin);
            }
            Command::Activate { entry_id, reply } => {
                let _ = reply.send(scheduler.activate(&entry_id));
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(scheduler.snapshot());
            }
            Command::Settings { reply } => {
                let _ = reply.send(scheduler.persisted_settings().clone());
            }
            Command::Shutdown { reply } => {
                scheduler.shutdown();
                let _ = reply.send(());
                info!("Prefetch service stopped");
                return;
            }
        }
    }

    scheduler.shutdown();
    info!("Prefetch service stopped (all handles dropped)");
}

/// Fold queued switch requests into the latest one ("latest wins")
///
/// Stops at the first non-switch command, which goes to the backlog so later
/// switches never overtake it.
fn coalesce_switches(
    mut node: Option<NodeId>,
    mut reply: Option<Reply<Vec<EntryId>>>,
    cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    backlog: &mut VecDeque<Command>,
) -> (Option<NodeId>, Option<Reply<Vec<EntryId>>>) {
    if !backlog.is_empty() {
        return (node, reply);
    }

    while let Ok(next) = cmd_rx.try_recv() {
        match next {
            Command::SwitchTo {
                node: newer,
                reply: newer_reply,
            } => {
                debug!(
                    "Coalescing switch to {:?} into newer switch to {:?}",
                    node, newer
                );
                if let Some(old) = reply.take() {
                    let _ = old.send(Err(Error::Superseded));
                }
                node = newer;
                reply = newer_reply;
            }
            other => {
                backlog.push_back(other);
                break;
            }
        }
    }

    (node, reply)
}

/// Cloneable client for a running [`PrefetchService`]
#[derive(Debug, Clone)]
pub struct PrefetchHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
    events: EventBus,
}

impl PrefetchHandle {
    fn send(&self, command: Command) -> Result<()> {
        self.cmd_tx.send(command).map_err(|_| Error::ServiceStopped)
    }

    /// Switch the active node and wait for the resulting plan
    pub async fn switch_to(&self, node: Option<NodeId>) -> Result<Vec<EntryId>> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::SwitchTo {
            node,
            reply: Some(tx),
        })?;
        rx.await.map_err(|_| Error::ServiceStopped)?
    }

    /// Switch the active node without waiting
    pub fn request_switch(&self, node: Option<NodeId>) -> Result<()> {
        self.send(Command::SwitchTo { node, reply: None })
    }

    /// Propagate a viewer preference change from `origin`
    pub fn apply_setting(&self, setting: PlayerSetting, origin: Option<PlayerId>) -> Result<()> {
        self.send(Command::ApplySetting { setting, origin })
    }

    /// Start playback of a buffered entry
    pub async fn activate(&self, entry_id: EntryId) -> Result<PlayerId> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Activate { entry_id, reply: tx })?;
        rx.await.map_err(|_| Error::ServiceStopped)?
    }

    /// Current buffer list, in priority order
    pub async fn snapshot(&self) -> Result<Vec<BufferItemInfo>> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply: tx })?;
        rx.await.map_err(|_| Error::ServiceStopped)
    }

    /// Current persisted viewer preferences
    pub async fn persisted_settings(&self) -> Result<PersistedSettings> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Settings { reply: tx })?;
        rx.await.map_err(|_| Error::ServiceStopped)
    }

    /// Release every player and stop the task
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Shutdown { reply: tx })?;
        rx.await.map_err(|_| Error::ServiceStopped)
    }

    pub fn subscribe(&self, kind: PrefetchEventKind) -> broadcast::Receiver<PrefetchEvent> {
        self.events.subscribe(kind)
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<PrefetchEvent> {
        self.events.subscribe_all()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}
