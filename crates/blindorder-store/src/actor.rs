//! Room actor: an isolated Tokio task that owns one room aggregate.
//!
//! Each live room runs in its own task and is mutated only through its
//! command channel, so concurrent operations on one room are applied
//! strictly in arrival order while different rooms proceed in parallel.
//! The actor also owns the per-participant outbound senders: because
//! every broadcast leaves from the same task that applied the mutation,
//! all attached connections observe the same sequence of updates.
//!
//! Durable writes are scheduled after the in-memory mutation and its
//! broadcast; a failed write is retried once and logged, never surfaced
//! as an operation failure — the in-memory aggregate stays authoritative
//! for the room's lifetime.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use blindorder_engine::{
    self as engine, now_millis, GameError, GameEvent, GameEventPayload,
    GameOutcome, MoveOutcome, Player, PlayerId, Room, RoomCode, RoomPhase,
};
use blindorder_protocol::ServerMessage;
use tokio::sync::{mpsc, oneshot};

use crate::{DurableStore, StoreError};

/// Channel over which a participant's connection receives broadcasts.
pub type ConnectionSender = mpsc::UnboundedSender<ServerMessage>;

/// What a leave did to the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// The room was torn down (last participant left, or the host left
    /// while still in the lobby). The caller must drop its handle.
    pub deleted: bool,
}

/// A snapshot of room metadata for listings and the idle sweep.
#[derive(Debug, Clone)]
pub struct RoomStatus {
    pub code: RoomCode,
    pub phase: RoomPhase,
    pub player_count: usize,
    /// Connections currently attached (may lag `player_count` after a
    /// cold load, before anyone has rebound).
    pub attached: usize,
    /// Time since the last mutation.
    pub idle_for: Duration,
}

/// Commands sent to a room actor through its channel.
pub(crate) enum RoomCommand {
    Join {
        player_id: PlayerId,
        username: String,
        is_host: bool,
        sender: ConnectionSender,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
    Leave {
        player_id: PlayerId,
        reply: oneshot::Sender<Result<LeaveOutcome, StoreError>>,
    },
    StartGame {
        player_id: PlayerId,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
    PlayNumber {
        player_id: PlayerId,
        number: u8,
        reply: oneshot::Sender<Result<MoveOutcome, StoreError>>,
    },
    ResetGame {
        player_id: PlayerId,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
    UpdateSettings {
        max_lives: Option<u32>,
        numbers_per_player: Option<u32>,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
    SetHost {
        player_id: PlayerId,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
    Status {
        reply: oneshot::Sender<RoomStatus>,
    },
    Snapshot {
        reply: oneshot::Sender<Room>,
    },
    /// Stop the actor. With a reason, the room is being deleted: remaining
    /// connections are notified and the durable record removed. Without
    /// one, this is an eviction — the durable record stays for a future
    /// cold load.
    Shutdown {
        reason: Option<String>,
    },
}

/// Handle to a running room actor. Cheap to clone; the registry holds
/// one per resident room and the gateway borrows clones per operation.
#[derive(Clone)]
pub struct RoomHandle {
    code: RoomCode,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    fn unavailable(&self) -> StoreError {
        StoreError::Unavailable(self.code.clone())
    }

    async fn request<T>(
        &self,
        cmd: RoomCommand,
        rx: oneshot::Receiver<T>,
    ) -> Result<T, StoreError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| self.unavailable())?;
        rx.await.map_err(|_| self.unavailable())
    }

    /// Adds or rebinds a participant and attaches their outbound sender.
    pub async fn join(
        &self,
        player_id: PlayerId,
        username: String,
        is_host: bool,
        sender: ConnectionSender,
    ) -> Result<(), StoreError> {
        let (reply, rx) = oneshot::channel();
        self.request(
            RoomCommand::Join {
                player_id,
                username,
                is_host,
                sender,
                reply,
            },
            rx,
        )
        .await?
    }

    /// Removes a participant, applying the host-failover/deletion policy.
    pub async fn leave(
        &self,
        player_id: PlayerId,
    ) -> Result<LeaveOutcome, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.request(RoomCommand::Leave { player_id, reply }, rx)
            .await?
    }

    /// Starts the game. Host only.
    pub async fn start_game(
        &self,
        player_id: PlayerId,
    ) -> Result<(), StoreError> {
        let (reply, rx) = oneshot::channel();
        self.request(RoomCommand::StartGame { player_id, reply }, rx)
            .await?
    }

    /// Plays one number from the participant's hand.
    pub async fn play_number(
        &self,
        player_id: PlayerId,
        number: u8,
    ) -> Result<MoveOutcome, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.request(
            RoomCommand::PlayNumber {
                player_id,
                number,
                reply,
            },
            rx,
        )
        .await?
    }

    /// Returns the room to the lobby. Host only.
    pub async fn reset_game(
        &self,
        player_id: PlayerId,
    ) -> Result<(), StoreError> {
        let (reply, rx) = oneshot::channel();
        self.request(RoomCommand::ResetGame { player_id, reply }, rx)
            .await?
    }

    /// Changes room settings. Lobby only.
    pub async fn update_settings(
        &self,
        max_lives: Option<u32>,
        numbers_per_player: Option<u32>,
    ) -> Result<(), StoreError> {
        let (reply, rx) = oneshot::channel();
        self.request(
            RoomCommand::UpdateSettings {
                max_lives,
                numbers_per_player,
                reply,
            },
            rx,
        )
        .await?
    }

    /// Hands the host role to an existing participant.
    pub async fn set_host(
        &self,
        player_id: PlayerId,
    ) -> Result<(), StoreError> {
        let (reply, rx) = oneshot::channel();
        self.request(RoomCommand::SetHost { player_id, reply }, rx)
            .await?
    }

    /// Requests the current room status.
    pub async fn status(&self) -> Result<RoomStatus, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.request(RoomCommand::Status { reply }, rx).await
    }

    /// Requests a read-only copy of the aggregate.
    pub async fn snapshot(&self) -> Result<Room, StoreError> {
        let (reply, rx) = oneshot::channel();
        self.request(RoomCommand::Snapshot { reply }, rx).await
    }

    /// Tells the room to stop (see [`RoomCommand::Shutdown`]).
    pub async fn shutdown(
        &self,
        reason: Option<String>,
    ) -> Result<(), StoreError> {
        self.sender
            .send(RoomCommand::Shutdown { reason })
            .await
            .map_err(|_| self.unavailable())
    }
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor {
    room: Room,
    /// Outbound channel per attached connection.
    senders: HashMap<PlayerId, ConnectionSender>,
    /// Ordered queue into the room's persister task.
    persist_tx: mpsc::UnboundedSender<PersistJob>,
    receiver: mpsc::Receiver<RoomCommand>,
    last_activity: Instant,
    closing: bool,
}

impl RoomActor {
    async fn run(mut self) {
        tracing::info!(room = %self.room.id, "room actor started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RoomCommand::Join {
                    player_id,
                    username,
                    is_host,
                    sender,
                    reply,
                } => {
                    let result =
                        self.handle_join(player_id, username, is_host, sender);
                    let _ = reply.send(result);
                }
                RoomCommand::Leave { player_id, reply } => {
                    let result = self.handle_leave(player_id);
                    let _ = reply.send(result);
                }
                RoomCommand::StartGame { player_id, reply } => {
                    let _ = reply.send(self.handle_start(player_id));
                }
                RoomCommand::PlayNumber {
                    player_id,
                    number,
                    reply,
                } => {
                    let _ = reply.send(self.handle_play(player_id, number));
                }
                RoomCommand::ResetGame { player_id, reply } => {
                    let _ = reply.send(self.handle_reset(player_id));
                }
                RoomCommand::UpdateSettings {
                    max_lives,
                    numbers_per_player,
                    reply,
                } => {
                    let _ = reply.send(
                        self.handle_update_settings(
                            max_lives,
                            numbers_per_player,
                        ),
                    );
                }
                RoomCommand::SetHost { player_id, reply } => {
                    let _ = reply.send(self.handle_set_host(player_id));
                }
                RoomCommand::Status { reply } => {
                    let _ = reply.send(self.status());
                }
                RoomCommand::Snapshot { reply } => {
                    let _ = reply.send(self.room.clone());
                }
                RoomCommand::Shutdown { reason } => {
                    if let Some(reason) = reason {
                        tracing::info!(
                            room = %self.room.id, %reason, "room deleted"
                        );
                        self.broadcast(ServerMessage::RoomDeleted { reason });
                        self.persist_delete();
                    }
                    self.closing = true;
                }
            }

            if self.closing {
                break;
            }
        }

        tracing::info!(room = %self.room.id, "room actor stopped");
    }

    fn handle_join(
        &mut self,
        player_id: PlayerId,
        username: String,
        is_host: bool,
        sender: ConnectionSender,
    ) -> Result<(), StoreError> {
        self.touch();

        // Rebind-or-create: a known username means the same participant
        // is back on a fresh connection. The hand survives; only the
        // connection identity changes.
        if let Some(idx) = self
            .room
            .players
            .iter()
            .position(|p| p.username == username)
        {
            let old_id = self.room.players[idx].id;
            self.room.players[idx].id = player_id;
            if self.room.host_id == Some(old_id) {
                self.room.host_id = Some(player_id);
            }
            self.senders.remove(&old_id);
            self.senders.insert(player_id, sender);
            self.room.touch(now_millis());

            tracing::info!(
                room = %self.room.id,
                %username,
                old = %old_id,
                new = %player_id,
                "participant rebound to new connection"
            );

            self.persist(true);
            self.broadcast(ServerMessage::RoomUpdated(self.room.clone()));
            if !self.room.state.is_lobby() {
                // Only the rejoining connection is missing the projection.
                self.send_to(
                    player_id,
                    ServerMessage::GameStateUpdated(engine::game_state(
                        &self.room,
                    )),
                );
            }
            return Ok(());
        }

        if !self.room.state.is_lobby() {
            return Err(GameError::StateConflict(
                "Game already in progress".into(),
            )
            .into());
        }

        if is_host || self.room.host_id.is_none() {
            self.room.host_id = Some(player_id);
        }
        self.room.players.push(Player {
            id: player_id,
            username: username.clone(),
            numbers: Vec::new(),
            joined_at: now_millis(),
        });
        self.senders.insert(player_id, sender);
        self.room.touch(now_millis());

        tracing::info!(
            room = %self.room.id,
            %player_id,
            %username,
            players = self.room.players.len(),
            host = self.room.host_id == Some(player_id),
            "participant joined"
        );

        self.persist(true);
        self.broadcast(ServerMessage::RoomUpdated(self.room.clone()));
        Ok(())
    }

    fn handle_leave(
        &mut self,
        player_id: PlayerId,
    ) -> Result<LeaveOutcome, StoreError> {
        self.touch();

        let Some(idx) =
            self.room.players.iter().position(|p| p.id == player_id)
        else {
            return Err(GameError::NotFound(
                "Player not in this room".into(),
            )
            .into());
        };
        let player = self.room.players.remove(idx);
        self.senders.remove(&player_id);
        let was_host = self.room.host_id == Some(player_id);

        tracing::info!(
            room = %self.room.id,
            %player_id,
            username = %player.username,
            remaining = self.room.players.len(),
            was_host,
            "participant left"
        );

        if self.room.players.is_empty() {
            self.persist_delete();
            self.closing = true;
            return Ok(LeaveOutcome { deleted: true });
        }

        if was_host {
            if self.room.state.is_lobby() {
                // A lobby has no state worth preserving without its host.
                self.broadcast(ServerMessage::RoomDeleted {
                    reason: "Host left the lobby".into(),
                });
                self.persist_delete();
                self.closing = true;
                return Ok(LeaveOutcome { deleted: true });
            }
            // Mid-game, the earliest remaining joiner takes over.
            self.room.host_id = self.room.players.first().map(|p| p.id);
            tracing::info!(
                room = %self.room.id,
                new_host = ?self.room.host_id,
                "host reassigned"
            );
        }

        self.room.touch(now_millis());
        self.persist_player_delete(player_id);
        self.persist(false);
        self.broadcast(ServerMessage::RoomUpdated(self.room.clone()));
        if !self.room.state.is_lobby() {
            self.broadcast(ServerMessage::GameStateUpdated(
                engine::game_state(&self.room),
            ));
        }
        Ok(LeaveOutcome { deleted: false })
    }

    fn handle_start(&mut self, player_id: PlayerId) -> Result<(), StoreError> {
        self.touch();

        if self.room.host_id != Some(player_id) {
            return Err(GameError::StateConflict(
                "Only the host can start the game".into(),
            )
            .into());
        }

        engine::initialize_game(&mut self.room, &mut rand::rng())?;
        engine::add_game_event(
            &mut self.room,
            GameEvent::now(GameEventPayload::GameStarted {
                message: "Game started! Work together to play all numbers \
                          in ascending order. No communication allowed!"
                    .into(),
            }),
        );
        self.room.touch(now_millis());

        tracing::info!(
            room = %self.room.id,
            players = self.room.players.len(),
            numbers = self.room.total_numbers(),
            "game started"
        );

        self.persist(true);
        self.broadcast_room_and_state();
        Ok(())
    }

    fn handle_play(
        &mut self,
        player_id: PlayerId,
        number: u8,
    ) -> Result<MoveOutcome, StoreError> {
        self.touch();

        let player_name = self
            .room
            .player(player_id)
            .map(|p| p.username.clone())
            .unwrap_or_default();

        let outcome = engine::make_move(&mut self.room, player_id, number)?;

        if outcome.correct {
            let timeline = self.room.timeline.clone();
            engine::add_game_event(
                &mut self.room,
                GameEvent::now(GameEventPayload::MoveMade {
                    player_id,
                    player_name,
                    number,
                    timeline,
                }),
            );
            if outcome.victory {
                engine::add_game_event(
                    &mut self.room,
                    GameEvent::now(GameEventPayload::GameEnded {
                        result: GameOutcome::Victory,
                        message: "Congratulations! You completed the \
                                  sequence!"
                            .into(),
                    }),
                );
                tracing::info!(room = %self.room.id, "game won");
            }
        } else {
            let lives = self.room.lives;
            engine::add_game_event(
                &mut self.room,
                GameEvent::now(GameEventPayload::MoveFailed {
                    player_id,
                    player_name,
                    number,
                    lives_lost: outcome.lives_lost,
                    lives,
                }),
            );
            if outcome.game_over {
                engine::add_game_event(
                    &mut self.room,
                    GameEvent::now(GameEventPayload::GameEnded {
                        result: GameOutcome::Defeat,
                        message: "Game Over! You ran out of lives.".into(),
                    }),
                );
                tracing::info!(room = %self.room.id, "game lost");
            }
        }

        self.room.touch(now_millis());
        self.persist(true);
        self.broadcast_room_and_state();
        Ok(outcome)
    }

    fn handle_reset(&mut self, player_id: PlayerId) -> Result<(), StoreError> {
        self.touch();

        if self.room.host_id != Some(player_id) {
            return Err(GameError::StateConflict(
                "Only the host can reset the game".into(),
            )
            .into());
        }

        engine::reset_game(&mut self.room);
        engine::add_game_event(
            &mut self.room,
            GameEvent::now(GameEventPayload::GameReset {
                message: "Game has been reset".into(),
            }),
        );
        self.room.touch(now_millis());

        tracing::info!(room = %self.room.id, "game reset");

        self.persist(true);
        // Back in the lobby, so no projection accompanies the aggregate.
        self.broadcast(ServerMessage::RoomUpdated(self.room.clone()));
        Ok(())
    }

    fn handle_update_settings(
        &mut self,
        max_lives: Option<u32>,
        numbers_per_player: Option<u32>,
    ) -> Result<(), StoreError> {
        self.touch();

        if !self.room.state.is_lobby() {
            return Err(GameError::StateConflict(
                "Settings can only be changed in the lobby".into(),
            )
            .into());
        }

        if let Some(max_lives) = max_lives {
            self.room.max_lives = max_lives;
            // In the lobby, the budget tracks its ceiling.
            self.room.lives = max_lives;
        }
        if let Some(numbers_per_player) = numbers_per_player {
            self.room.numbers_per_player = numbers_per_player;
        }
        self.room.touch(now_millis());

        self.persist(false);
        self.broadcast(ServerMessage::RoomUpdated(self.room.clone()));
        Ok(())
    }

    fn handle_set_host(
        &mut self,
        player_id: PlayerId,
    ) -> Result<(), StoreError> {
        self.touch();

        if self.room.player(player_id).is_none() {
            return Err(GameError::NotFound(
                "Player not in this room".into(),
            )
            .into());
        }
        self.room.host_id = Some(player_id);
        self.room.touch(now_millis());

        tracing::info!(room = %self.room.id, %player_id, "host set");

        self.persist(false);
        self.broadcast(ServerMessage::RoomUpdated(self.room.clone()));
        Ok(())
    }

    fn status(&self) -> RoomStatus {
        RoomStatus {
            code: self.room.id.clone(),
            phase: self.room.state,
            player_count: self.room.players.len(),
            attached: self.senders.len(),
            idle_for: self.last_activity.elapsed(),
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Sends to every attached connection. A closed receiver means the
    /// connection is being torn down; the leave path removes its entry.
    fn broadcast(&self, msg: ServerMessage) {
        for sender in self.senders.values() {
            let _ = sender.send(msg.clone());
        }
    }

    fn broadcast_room_and_state(&self) {
        self.broadcast(ServerMessage::RoomUpdated(self.room.clone()));
        self.broadcast(ServerMessage::GameStateUpdated(engine::game_state(
            &self.room,
        )));
    }

    fn send_to(&self, player_id: PlayerId, msg: ServerMessage) {
        if let Some(sender) = self.senders.get(&player_id) {
            let _ = sender.send(msg);
        }
    }

    /// Queues a write-through of the aggregate. The persister task works
    /// the queue in order, off the actor task, so persistence latency
    /// never delays mutations or broadcasts and an older snapshot can
    /// never overwrite a newer one.
    fn persist(&self, players_changed: bool) {
        let _ = self.persist_tx.send(PersistJob::Write {
            room: self.room.clone(),
            players_changed,
        });
    }

    fn persist_delete(&self) {
        let _ = self.persist_tx.send(PersistJob::DeleteRoom);
    }

    fn persist_player_delete(&self, player_id: PlayerId) {
        let _ = self.persist_tx.send(PersistJob::DeletePlayer(player_id));
    }
}

/// One unit of write-through work for a room's persister task.
enum PersistJob {
    Write { room: Room, players_changed: bool },
    DeleteRoom,
    DeletePlayer(PlayerId),
}

/// Drains a room's persistence queue in order. Each step retries once;
/// failures are logged and swallowed — the in-memory aggregate is
/// authoritative and user-visible behavior must not depend on a
/// transient persistence fault. Exits when the actor drops its sender.
async fn run_persister<S: DurableStore>(
    store: Arc<S>,
    code: RoomCode,
    mut jobs: mpsc::UnboundedReceiver<PersistJob>,
) {
    while let Some(job) = jobs.recv().await {
        match job {
            PersistJob::Write {
                room,
                players_changed,
            } => {
                if with_retry(&code, "room write", || store.update_room(&room))
                    .await
                    && players_changed
                {
                    with_retry(&code, "player write", || {
                        store.save_players(&room.id, &room.players)
                    })
                    .await;
                }
            }
            PersistJob::DeleteRoom => {
                with_retry(&code, "room delete", || store.delete_room(&code))
                    .await;
            }
            PersistJob::DeletePlayer(player_id) => {
                with_retry(&code, "player delete", || {
                    store.delete_player(player_id)
                })
                .await;
            }
        }
    }
}

/// Runs a durable operation, retrying once. Returns whether it landed.
async fn with_retry<T, F, Fut>(code: &RoomCode, what: &str, op: F) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, crate::DurableError>>,
{
    if let Err(first) = op().await {
        tracing::warn!(
            room = %code, error = %first,
            "durable {what} failed, retrying once"
        );
        if let Err(second) = op().await {
            tracing::error!(
                room = %code, error = %second,
                "durable {what} failed after retry; in-memory state remains \
                 authoritative"
            );
            return false;
        }
    }
    true
}

/// Spawns a room actor task (and its persister) for the given aggregate
/// and returns a handle.
///
/// `channel_size` bounds the command queue — senders wait when it fills.
pub(crate) fn spawn_room<S: DurableStore>(
    room: Room,
    store: Arc<S>,
    channel_size: usize,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(channel_size);
    let (persist_tx, persist_rx) = mpsc::unbounded_channel();
    let code = room.id.clone();

    tokio::spawn(run_persister(
        Arc::clone(&store),
        code.clone(),
        persist_rx,
    ));

    let actor = RoomActor {
        room,
        senders: HashMap::new(),
        persist_tx,
        receiver: rx,
        last_activity: Instant::now(),
        closing: false,
    };

    tokio::spawn(actor.run());

    RoomHandle { code, sender: tx }
}
