use std::sync::Arc;

use bus::BusAdapter;
use sfu_client::{SfuClient, SfuEvent};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::Outbound;
use crate::error::HubError;
use crate::protocol::{
    AdminActionKind, ChatEntry, MediaKind, ParticipantView, ProtocolEvent, Role, SignalKind,
    decode_frame, encode_frame,
};
use crate::room::state::{Room, RoomSettings};

const ROOM_MAILBOX_CAPACITY: usize = 1024;
const WAITING_NOTIFY_TAG: &str = "room_event";

pub struct Inbound {
    pub client_id: String,
    pub event: ProtocolEvent,
}

pub enum RoomCommand {
    Join {
        client_id: String,
        display_name: String,
        target_lang: Option<String>,
        outbound: Outbound,
        reply: oneshot::Sender<Result<(), HubError>>,
    },
    Event(Inbound),
    Disconnect {
        client_id: String,
    },
    SfuEvent {
        client_id: String,
        event: SfuEvent,
    },
    BusEnvelope(bus::Envelope),
    /// Announces closure to every local client and severs their outbound
    /// queues; the room then winds itself down once it observes it's empty.
    Shutdown,
}

/// Handle to a running room actor. Cloning is cheap; every clone shares the
/// same bounded mailbox.
#[derive(Clone)]
pub struct RoomHandle {
    pub room_id: String,
    tx: async_channel::Sender<RoomCommand>,
    pub cancel: CancellationToken,
}

impl RoomHandle {
    pub fn send(&self, cmd: RoomCommand) {
        if self.tx.try_send(cmd).is_err() {
            warn!(room_id = %self.room_id, "room mailbox full or closed, dropping command");
        }
    }

    pub async fn join(
        &self,
        client_id: String,
        display_name: String,
        target_lang: Option<String>,
        outbound: Outbound,
    ) -> Result<(), HubError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(RoomCommand::Join {
                client_id,
                display_name,
                target_lang,
                outbound,
                reply: reply_tx,
            })
            .await
            .map_err(|_| HubError::Internal("room actor gone".to_string()))?;
        reply_rx
            .await
            .map_err(|_| HubError::Internal("room actor dropped reply".to_string()))?
    }
}

struct Ctx {
    bus: Arc<dyn BusAdapter>,
    sfu: Arc<dyn SfuClient>,
    summary_client: Option<reqwest::Client>,
    summary_addr: Option<String>,
}

/// Spawns the room's single-writer actor: one bounded mailbox, one worker
/// task. Returns immediately with a handle; the task runs until the room
/// empties out both locally and on the bus, or is cancelled.
pub fn spawn(
    room_id: String,
    settings: RoomSettings,
    bus: Arc<dyn BusAdapter>,
    sfu: Arc<dyn SfuClient>,
    summary_addr: Option<String>,
) -> (RoomHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = async_channel::bounded(ROOM_MAILBOX_CAPACITY);
    let cancel = CancellationToken::new();

    let handle = RoomHandle {
        room_id: room_id.clone(),
        tx: tx.clone(),
        cancel: cancel.clone(),
    };

    let bus_sink_cancel = cancel.clone();
    let (bus_tx, bus_rx) = async_channel::bounded(ROOM_MAILBOX_CAPACITY);
    bus.subscribe(&room_id, bus_tx, bus_sink_cancel);

    let forward_cancel = cancel.clone();
    let mailbox_for_bus = tx.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = forward_cancel.cancelled() => return,
                envelope = bus_rx.recv() => {
                    match envelope {
                        Ok(envelope) => {
                            if mailbox_for_bus.send(RoomCommand::BusEnvelope(envelope)).await.is_err() {
                                return;
                            }
                        }
                        Err(_) => return,
                    }
                }
            }
        }
    });

    let summary_client = summary_addr.as_ref().map(|_| reqwest::Client::new());
    let ctx = Ctx {
        bus,
        sfu,
        summary_client,
        summary_addr,
    };

    let join_handle = tokio::spawn(run(room_id, settings, rx, ctx, cancel));
    (handle, join_handle)
}

async fn run(
    room_id: String,
    settings: RoomSettings,
    mailbox: async_channel::Receiver<RoomCommand>,
    ctx: Ctx,
    cancel: CancellationToken,
) {
    let mut room = Room::new(room_id.clone(), settings);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            cmd = mailbox.recv() => {
                match cmd {
                    Ok(cmd) => handle_command(&mut room, &ctx, cmd).await,
                    Err(_) => break,
                }
            }
        }

        if room.is_empty() {
            let hosts = ctx.bus.set_members(&bus::hosts_key(&room_id)).await.unwrap_or_default();
            let participants = ctx.bus.set_members(&bus::participants_key(&room_id)).await.unwrap_or_default();
            if hosts.is_empty() && participants.is_empty() {
                info!(room_id = %room_id, "room empty locally and on the bus, closing");
                break;
            }
        }
    }

    cancel.cancel();
}

async fn handle_command(room: &mut Room, ctx: &Ctx, cmd: RoomCommand) {
    match cmd {
        RoomCommand::Join {
            client_id,
            display_name,
            target_lang,
            outbound,
            reply,
        } => {
            let _ = target_lang;
            let outcome = handle_join(room, ctx, &client_id, display_name, outbound).await;
            let _ = reply.send(outcome.map(|_| ()));
        }
        RoomCommand::Event(Inbound { client_id, event }) => {
            handle_event(room, ctx, &client_id, event).await;
        }
        RoomCommand::Disconnect { client_id } => {
            handle_leave(room, ctx, &client_id).await;
        }
        RoomCommand::SfuEvent { client_id, event } => {
            handle_sfu_event(room, ctx, &client_id, event).await;
        }
        RoomCommand::BusEnvelope(envelope) => {
            deliver_bus_envelope(room, envelope);
        }
        RoomCommand::Shutdown => {
            handle_shutdown(room, ctx).await;
        }
    }
}

async fn handle_shutdown(room: &mut Room, ctx: &Ctx) {
    broadcast(
        room,
        ctx,
        "system",
        None,
        &ProtocolEvent::AdminEvent {
            kind: "room_closing".to_string(),
            target_id: None,
        },
    )
    .await;
    for id in room.local_client_ids().cloned().collect::<Vec<_>>() {
        if let Some(entry) = room.client(&id) {
            entry.outbound.close();
        }
    }
}

async fn handle_join(
    room: &mut Room,
    ctx: &Ctx,
    client_id: &str,
    display_name: String,
    outbound: Outbound,
) -> Result<Role, HubError> {
    let role = room.insert_waiting_or_participant(client_id.to_string(), display_name.clone(), outbound)?;

    if role == Role::Waiting {
        roster_add(ctx, &room.room_id, Role::Waiting, client_id, &display_name).await;
        notify_hosts(
            room,
            ctx,
            client_id,
            ProtocolEvent::WaitingRequest {
                target_id: client_id.to_string(),
                display_name,
            },
        )
        .await;
        let _ = send_to(room, client_id, &ProtocolEvent::JoinResponse {
            success: true,
            reason: None,
            participants: vec![],
            role,
        });
        return Ok(role);
    }

    let sdp_offer = match ctx.sfu.create_session(client_id, &room.room_id).await {
        Ok(sdp) => Some(sdp),
        Err(err) => {
            warn!(room_id = %room.room_id, client_id, error = %err, "sfu create_session failed");
            None
        }
    };

    roster_add(ctx, &room.room_id, role, client_id, &display_name).await;

    let _ = send_to(
        room,
        client_id,
        &ProtocolEvent::JoinResponse {
            success: true,
            reason: None,
            participants: cluster_roster(room, ctx).await,
            role,
        },
    );

    if let Some(sdp) = sdp_offer {
        let _ = send_to(
            room,
            client_id,
            &ProtocolEvent::SignalEvent {
                kind: SignalKind::Offer,
                sdp: Some(sdp),
                candidate: None,
                sdp_mid: None,
                sdp_m_line_index: None,
            },
        );
    }

    broadcast_room_state(room, ctx, client_id.to_string(), None).await;
    Ok(role)
}

async fn handle_event(room: &mut Room, ctx: &Ctx, client_id: &str, event: ProtocolEvent) {
    if !room.contains(client_id) {
        warn!(room_id = %room.room_id, client_id, "event from unregistered client, dropping");
        return;
    }
    room.touch(client_id);

    match event {
        ProtocolEvent::AcceptWaiting { target_id } => {
            if !room.is_host(client_id) {
                send_error(room, client_id, &HubError::Forbidden("host-only action".to_string()));
                return;
            }
            match room.admit_from_waiting(&target_id) {
                Ok(()) => {
                    let display_name = room.client(&target_id).map(|c| c.display_name.clone()).unwrap_or_default();
                    roster_remove(ctx, &room.room_id, Role::Waiting, &target_id, &display_name).await;
                    roster_add(ctx, &room.room_id, Role::Participant, &target_id, &display_name).await;
                    let sdp_offer = ctx.sfu.create_session(&target_id, &room.room_id).await.ok();
                    let _ = send_to(room, &target_id, &ProtocolEvent::AcceptWaiting { target_id: target_id.clone() });
                    if let Some(sdp) = sdp_offer {
                        let _ = send_to(
                            room,
                            &target_id,
                            &ProtocolEvent::SignalEvent {
                                kind: SignalKind::Offer,
                                sdp: Some(sdp),
                                candidate: None,
                                sdp_mid: None,
                                sdp_m_line_index: None,
                            },
                        );
                    }
                    broadcast_room_state(room, ctx, client_id.to_string(), None).await;
                }
                Err(err) => {
                    warn!(room_id = %room.room_id, %err, "accept_waiting failed");
                }
            }
        }
        ProtocolEvent::DenyWaiting { target_id } => {
            if !room.is_host(client_id) {
                send_error(room, client_id, &HubError::Forbidden("host-only action".to_string()));
                return;
            }
            if let Ok(entry) = room.deny_waiting(&target_id) {
                roster_remove(ctx, &room.room_id, Role::Waiting, &target_id, &entry.display_name).await;
                if let Ok(frame) = encode_frame(&ProtocolEvent::DenyWaiting { target_id: target_id.clone() }) {
                    let _ = entry.outbound.send(frame);
                }
                entry.outbound.close();
                broadcast_room_state(room, ctx, client_id.to_string(), None).await;
            }
        }
        ProtocolEvent::AdminAction { action, target_id } => {
            handle_admin_action(room, ctx, client_id, action, target_id).await;
        }
        ProtocolEvent::ToggleMedia { kind, enabled } => {
            match kind {
                MediaKind::Audio => toggle(&mut room.unmuted, client_id, enabled),
                MediaKind::Video => toggle(&mut room.camera_on, client_id, enabled),
            }
            broadcast(
                room,
                ctx,
                client_id,
                None,
                &ProtocolEvent::MediaStateChanged {
                    client_id: client_id.to_string(),
                    kind,
                    enabled,
                },
            )
            .await;
        }
        ProtocolEvent::RaiseHand => {
            toggle(&mut room.hand_raised, client_id, true);
            broadcast(room, ctx, client_id, None, &ProtocolEvent::HandStateChanged {
                client_id: client_id.to_string(),
                raised: true,
            })
            .await;
        }
        ProtocolEvent::LowerHand => {
            toggle(&mut room.hand_raised, client_id, false);
            broadcast(room, ctx, client_id, None, &ProtocolEvent::HandStateChanged {
                client_id: client_id.to_string(),
                raised: false,
            })
            .await;
        }
        ProtocolEvent::ScreenShareRequest => {
            notify_hosts(
                room,
                ctx,
                client_id,
                ProtocolEvent::AdminEvent {
                    kind: "screen_share_requested".to_string(),
                    target_id: Some(client_id.to_string()),
                },
            )
            .await;
        }
        ProtocolEvent::ChatEvent { entry } => {
            handle_chat(room, ctx, client_id, entry).await;
        }
        ProtocolEvent::DeleteChatEvent { id } => {
            let is_host = room.is_host(client_id);
            let author_matches = room.chat.entry(id).map(|e| e.sender_id == client_id).unwrap_or(false);
            if !is_host && !author_matches {
                return;
            }
            if room.chat.remove(id).is_ok() {
                broadcast(room, ctx, client_id, None, &ProtocolEvent::DeleteChatEvent { id }).await;
            }
        }
        ProtocolEvent::GetRecentChats => {
            let entries = room.chat.recent();
            let _ = send_to(room, client_id, &ProtocolEvent::RecentChats { entries });
        }
        ProtocolEvent::SignalRequest { target_id, kind, sdp, candidate, sdp_mid, sdp_m_line_index } => {
            handle_signal(room, ctx, client_id, target_id, kind, sdp, candidate, sdp_mid, sdp_m_line_index).await;
        }
        ProtocolEvent::Summarize => {
            handle_summarize(room, ctx, client_id).await;
        }
        ProtocolEvent::Heartbeat => {}
        other => {
            warn!(room_id = %room.room_id, client_id, event = ?other, "unhandled event variant, dropping");
        }
    }
}

async fn handle_admin_action(
    room: &mut Room,
    ctx: &Ctx,
    client_id: &str,
    action: AdminActionKind,
    target_id: String,
) {
    if !room.is_host(client_id) {
        send_error(room, client_id, &HubError::Forbidden("host-only action".to_string()));
        return;
    }
    match action {
        AdminActionKind::TransferOwnership => {
            let from_name = room.client(client_id).map(|c| c.display_name.clone()).unwrap_or_default();
            let to_name = room.client(&target_id).map(|c| c.display_name.clone()).unwrap_or_default();
            if room.transfer_ownership(client_id, &target_id).is_ok() {
                roster_remove(ctx, &room.room_id, Role::Host, client_id, &from_name).await;
                roster_add(ctx, &room.room_id, Role::Participant, client_id, &from_name).await;
                roster_remove(ctx, &room.room_id, Role::Participant, &target_id, &to_name).await;
                roster_add(ctx, &room.room_id, Role::Host, &target_id, &to_name).await;
                broadcast(
                    room,
                    ctx,
                    client_id,
                    None,
                    &ProtocolEvent::AdminEvent {
                        kind: "ownership_transferred".to_string(),
                        target_id: Some(target_id),
                    },
                )
                .await;
                broadcast_room_state(room, ctx, client_id.to_string(), None).await;
            }
        }
        AdminActionKind::Kick => {
            let _ = send_to(room, &target_id, &ProtocolEvent::AdminEvent {
                kind: "kicked".to_string(),
                target_id: Some(target_id.clone()),
            });
            handle_leave(room, ctx, &target_id).await;
        }
        AdminActionKind::AcceptScreenShare | AdminActionKind::DenyScreenShare => {
            let sharing = action == AdminActionKind::AcceptScreenShare;
            toggle(&mut room.sharing, &target_id, sharing);
            broadcast(room, ctx, client_id, None, &ProtocolEvent::ScreenShareChanged {
                client_id: target_id,
                sharing,
            })
            .await;
        }
    }
}

async fn handle_chat(room: &mut Room, ctx: &Ctx, client_id: &str, entry: ChatEntry) {
    if !room.chat_rate.check(client_id) {
        warn!(room_id = %room.room_id, client_id, "chat rate limit exceeded");
        return;
    }

    if entry.is_private {
        if let Some(target_id) = entry.target_id.clone() {
            if !room.contains(&target_id) {
                return;
            }
        }
    }

    let sender_name = room
        .client(client_id)
        .map(|c| c.display_name.clone())
        .unwrap_or_default();
    let now = chrono::Utc::now().timestamp();

    let stored = match room.chat.push(
        client_id.to_string(),
        sender_name,
        entry.content,
        now,
        entry.is_private,
        entry.target_id.clone(),
    ) {
        Ok(entry) => entry,
        Err(err) => {
            warn!(room_id = %room.room_id, client_id, %err, "chat rejected");
            return;
        }
    };

    if stored.is_private {
        if let Some(target_id) = stored.target_id.clone() {
            let _ = send_to(room, &target_id, &ProtocolEvent::ChatEvent { entry: stored.clone() });
        }
        let _ = send_to(room, client_id, &ProtocolEvent::ChatEvent { entry: stored });
    } else {
        broadcast(room, ctx, client_id, None, &ProtocolEvent::ChatEvent { entry: stored }).await;
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_signal(
    room: &mut Room,
    ctx: &Ctx,
    client_id: &str,
    target_id: Option<String>,
    kind: SignalKind,
    sdp: Option<String>,
    candidate: Option<String>,
    sdp_mid: Option<String>,
    sdp_m_line_index: Option<u32>,
) {
    if let Some(target_id) = target_id {
        let event = ProtocolEvent::SignalEvent {
            kind,
            sdp: sdp.clone(),
            candidate: candidate.clone(),
            sdp_mid: sdp_mid.clone(),
            sdp_m_line_index,
        };
        if room.contains(&target_id) {
            let _ = send_to(room, &target_id, &event);
        } else if let Ok(payload) = encode_frame(&event) {
            let _ = ctx
                .bus
                .publish_direct(&target_id, "signal", payload, client_id)
                .await;
        }
        return;
    }

    let signal = match kind {
        SignalKind::Offer => sfu_client::SignalKind::Offer(sdp.unwrap_or_default()),
        SignalKind::Answer => sfu_client::SignalKind::Answer(sdp.unwrap_or_default()),
        SignalKind::Candidate => sfu_client::SignalKind::Candidate {
            candidate: candidate.unwrap_or_default(),
            sdp_mid,
            sdp_m_line_index,
        },
    };

    if let Err(err) = ctx.sfu.handle_signal(client_id, &room.room_id, signal).await {
        warn!(room_id = %room.room_id, client_id, %err, "sfu handle_signal failed");
    }
}

async fn handle_summarize(room: &mut Room, ctx: &Ctx, client_id: &str) {
    if !room.is_host(client_id) {
        send_error(room, client_id, &HubError::Forbidden("host-only action".to_string()));
        return;
    }

    let (Some(client), Some(addr)) = (ctx.summary_client.as_ref(), ctx.summary_addr.as_ref()) else {
        let _ = send_to(room, client_id, &ProtocolEvent::SummaryResult { success: false, summary: None });
        return;
    };

    let transcript: Vec<String> = room.chat.recent().into_iter().map(|e| format!("{}: {}", e.sender_name, e.content)).collect();
    let result = client
        .post(format!("{addr}/summarize"))
        .json(&serde_json::json!({ "room_id": room.room_id, "transcript": transcript }))
        .send()
        .await;

    match result {
        Ok(resp) => match resp.json::<serde_json::Value>().await {
            Ok(body) => {
                let summary = body.get("summary").and_then(|v| v.as_str()).map(|s| s.to_string());
                let _ = send_to(room, client_id, &ProtocolEvent::SummaryResult { success: true, summary });
            }
            Err(_) => {
                let _ = send_to(room, client_id, &ProtocolEvent::SummaryResult { success: false, summary: None });
            }
        },
        Err(err) => {
            warn!(room_id = %room.room_id, %err, "summary service call failed");
            let _ = send_to(room, client_id, &ProtocolEvent::SummaryResult { success: false, summary: None });
        }
    }
}

async fn handle_leave(room: &mut Room, ctx: &Ctx, client_id: &str) {
    let Some(entry) = room.remove(client_id) else { return };
    entry.outbound.close();

    roster_remove(ctx, &room.room_id, entry.role, client_id, &entry.display_name).await;
    if let Err(err) = ctx.sfu.delete_session(client_id, &room.room_id).await {
        warn!(room_id = %room.room_id, client_id, %err, "sfu delete_session failed");
    }

    broadcast_room_state(room, ctx, client_id.to_string(), None).await;
}

async fn handle_sfu_event(room: &mut Room, ctx: &Ctx, client_id: &str, event: SfuEvent) {
    let wire = match event {
        SfuEvent::TrackAdded { stream_id, user_id, track_id, is_video } => {
            ProtocolEvent::TrackAdded { stream_id, user_id, track_id, is_video }
        }
        SfuEvent::SdpOffer(sdp) => ProtocolEvent::SignalEvent {
            kind: SignalKind::Offer,
            sdp: Some(sdp),
            candidate: None,
            sdp_mid: None,
            sdp_m_line_index: None,
        },
        SfuEvent::SdpAnswer(sdp) => ProtocolEvent::SignalEvent {
            kind: SignalKind::Answer,
            sdp: Some(sdp),
            candidate: None,
            sdp_mid: None,
            sdp_m_line_index: None,
        },
        SfuEvent::IceCandidate { candidate, sdp_mid, sdp_m_line_index } => ProtocolEvent::SignalEvent {
            kind: SignalKind::Candidate,
            sdp: None,
            candidate: Some(candidate),
            sdp_mid,
            sdp_m_line_index,
        },
        SfuEvent::Caption { user_id, language, text, is_final } => {
            // Captions are a room event, not a per-client one: every local
            // participant sees the same transcript line.
            broadcast(
                room,
                ctx,
                client_id,
                None,
                &ProtocolEvent::Caption { user_id, language, text, is_final },
            )
            .await;
            return;
        }
    };
    let _ = send_to(room, client_id, &wire);
}

/// Delivers a bus-sourced envelope to matching local clients, dropping it
/// if `sender_id` belongs to one of them (echo suppression).
fn deliver_bus_envelope(room: &mut Room, envelope: bus::Envelope) {
    if room.contains(&envelope.sender_id) {
        return;
    }
    let Ok(event) = decode_frame(&envelope.payload) else {
        return;
    };

    let targets: Vec<String> = match &envelope.roles {
        Some(roles) => room
            .local_client_ids()
            .filter(|id| {
                room.client(id)
                    .map(|c| roles.iter().any(|r| role_matches(c.role, r)))
                    .unwrap_or(false)
            })
            .cloned()
            .collect(),
        None => room.local_client_ids().cloned().collect(),
    };

    for target in targets {
        let _ = send_to(room, &target, &event);
    }
}

fn role_matches(role: Role, tag: &str) -> bool {
    matches!(
        (role, tag),
        (Role::Host, "host") | (Role::Participant, "participant") | (Role::Waiting, "waiting")
    )
}

fn roster_key_for(room_id: &str, role: Role) -> String {
    match role {
        Role::Host => bus::hosts_key(room_id),
        Role::Participant => bus::participants_key(room_id),
        Role::Waiting => bus::waiting_key(room_id),
    }
}

/// Publishes this client's membership into the distributed roster set for
/// its role, so a sibling instance can render it without a local connection.
async fn roster_add(ctx: &Ctx, room_id: &str, role: Role, client_id: &str, display_name: &str) {
    let key = roster_key_for(room_id, role);
    let member = bus::RosterEntry {
        client_id: client_id.to_string(),
        display_name: display_name.to_string(),
    }
    .encode();
    let _ = ctx.bus.set_add(&key, &member).await;
}

async fn roster_remove(ctx: &Ctx, room_id: &str, role: Role, client_id: &str, display_name: &str) {
    let key = roster_key_for(room_id, role);
    let member = bus::RosterEntry {
        client_id: client_id.to_string(),
        display_name: display_name.to_string(),
    }
    .encode();
    let _ = ctx.bus.set_rem(&key, &member).await;
}

/// Merges the local roster with remote roster-set members not already
/// known locally, so `JoinResponse`/`RoomState` reflect participants
/// connected to sibling instances.
async fn cluster_roster(room: &Room, ctx: &Ctx) -> Vec<ParticipantView> {
    let mut views = room.roster();
    let known: std::collections::HashSet<String> = views.iter().map(|v| v.client_id.clone()).collect();

    for (key, role) in [
        (bus::hosts_key(&room.room_id), Role::Host),
        (bus::participants_key(&room.room_id), Role::Participant),
    ] {
        let members = ctx.bus.set_members(&key).await.unwrap_or_default();
        for raw in members {
            let Some(entry) = bus::RosterEntry::decode(&raw) else { continue };
            if known.contains(&entry.client_id) {
                continue;
            }
            views.push(ParticipantView {
                client_id: entry.client_id,
                display_name: entry.display_name,
                role,
                camera_on: false,
                unmuted: false,
                sharing: false,
                hand_raised: false,
            });
        }
    }
    views
}

fn toggle(set: &mut std::collections::HashSet<String>, client_id: &str, enabled: bool) {
    if enabled {
        set.insert(client_id.to_string());
    } else {
        set.remove(client_id);
    }
}

fn send_to(room: &Room, client_id: &str, event: &ProtocolEvent) -> Result<(), HubError> {
    let Some(entry) = room.client(client_id) else {
        return Err(HubError::NotFound(client_id.to_string()));
    };
    let frame = encode_frame(event)?;
    entry.outbound.send(frame)
}

/// Surfaces a rejected action back to its sender as a terminal `Error`
/// frame, rather than silently dropping the event.
fn send_error(room: &Room, client_id: &str, err: &HubError) {
    let _ = send_to(room, client_id, &ProtocolEvent::Error {
        code: err.code().to_string(),
        message: err.to_string(),
    });
}

async fn broadcast(
    room: &mut Room,
    ctx: &Ctx,
    sender_id: &str,
    roles: Option<Vec<String>>,
    event: &ProtocolEvent,
) {
    let targets: Vec<String> = match &roles {
        Some(roles) => room
            .local_client_ids()
            .filter(|id| {
                room.client(id)
                    .map(|c| roles.iter().any(|r| role_matches(c.role, r)))
                    .unwrap_or(false)
            })
            .cloned()
            .collect(),
        None => room.local_client_ids().cloned().collect(),
    };

    let mut slow = Vec::new();
    for target in targets {
        if let Err(HubError::SlowConsumer) = send_to(room, &target, event) {
            slow.push(target);
        }
    }
    for target in slow {
        warn!(room_id = %room.room_id, client_id = %target, "slow consumer, disconnecting");
        handle_leave(room, ctx, &target).await;
    }

    if let Ok(payload) = encode_frame(event) {
        let _ = ctx
            .bus
            .publish(&room.room_id, WAITING_NOTIFY_TAG, payload, sender_id, roles)
            .await;
    }
}

async fn broadcast_room_state(room: &mut Room, ctx: &Ctx, sender_id: String, roles: Option<Vec<String>>) {
    let participants = cluster_roster(room, ctx).await;
    let event = ProtocolEvent::RoomState { participants };
    broadcast(room, ctx, &sender_id, roles, &event).await;
}

/// Delivers a host-only event: local hosts get it directly, and it's
/// published to the bus with a `["host"]` role mask so a host connected to
/// a sibling instance receives it too.
async fn notify_hosts(room: &mut Room, ctx: &Ctx, sender_id: &str, event: ProtocolEvent) {
    broadcast(room, ctx, sender_id, Some(vec!["host".to_string()]), &event).await;
}
