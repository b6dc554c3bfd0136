use meshcall_core::{IceCandidate, PeerId, SessionDescription, TrackKind};
use std::collections::BTreeSet;

/// Which side of a pair sends the offers. The newcomer initiates, the peer
/// already in the room responds. A responder that needs renegotiation asks
/// the initiator for a fresh offer instead of making one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    Initiator,
    Responder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Created,
    Negotiating,
    Connected,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkInput {
    /// Local side wants to (re)negotiate.
    StartOffer,
    /// The responder asked us for a fresh offer.
    RenegotiationRequested,
    RemoteOffer(String),
    RemoteAnswer(String),
    RemoteCandidate(IceCandidate),
    TransportUp,
    /// Connectivity lost but may come back.
    TransportInterrupted,
    TransportFailed,
    Close,
}

/// Side effects the owner must perform, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    CreateAndSendOffer,
    /// Ask the initiator to send a new offer.
    RequestOffer,
    ApplyRemote(SessionDescription),
    CreateAndSendAnswer,
    ApplyCandidate(IceCandidate),
    Teardown,
}

/// What attaching a local track means for an existing connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderUpdate {
    /// A sender of that kind exists; swap its track.
    Replace,
    /// New sender; needs renegotiation once the link has started.
    Add,
}

/// Negotiation state of one connection, free of any I/O.
#[derive(Debug, Clone)]
pub struct PeerLink {
    peer_id: PeerId,
    link_id: u64,
    role: LinkRole,
    closed: bool,
    transport_up: bool,
    started: bool,
    awaiting_answer: bool,
    offer_requested: bool,
    remote_description_set: bool,
    renegotiate_pending: bool,
    pending_ice: Vec<IceCandidate>,
    senders: BTreeSet<TrackKind>,
}

impl PeerLink {
    pub fn new(peer_id: PeerId, link_id: u64, role: LinkRole) -> Self {
        Self {
            peer_id,
            link_id,
            role,
            closed: false,
            transport_up: false,
            started: false,
            awaiting_answer: false,
            offer_requested: false,
            remote_description_set: false,
            renegotiate_pending: false,
            pending_ice: Vec::new(),
            senders: BTreeSet::new(),
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn link_id(&self) -> u64 {
        self.link_id
    }

    pub fn role(&self) -> LinkRole {
        self.role
    }

    pub fn state(&self) -> LinkState {
        if self.closed {
            LinkState::Closed
        } else if self.transport_up {
            LinkState::Connected
        } else if self.started {
            LinkState::Negotiating
        } else {
            LinkState::Created
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// True while our offer is out and unanswered.
    pub fn is_awaiting_answer(&self) -> bool {
        self.awaiting_answer
    }

    pub fn senders(&self) -> Vec<TrackKind> {
        self.senders.iter().copied().collect()
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_ice.len()
    }

    pub fn attach(&mut self, kind: TrackKind) -> SenderUpdate {
        if self.senders.insert(kind) {
            SenderUpdate::Add
        } else {
            SenderUpdate::Replace
        }
    }

    pub fn step(&mut self, input: LinkInput) -> Vec<LinkAction> {
        if self.closed {
            return Vec::new();
        }

        match input {
            LinkInput::StartOffer => match self.role {
                LinkRole::Initiator => self.offer(),
                LinkRole::Responder => {
                    if self.offer_requested {
                        return Vec::new();
                    }
                    self.offer_requested = true;
                    vec![LinkAction::RequestOffer]
                }
            },

            LinkInput::RenegotiationRequested => match self.role {
                LinkRole::Initiator => self.offer(),
                LinkRole::Responder => Vec::new(),
            },

            LinkInput::RemoteOffer(sdp) => {
                // Only the initiator offers, so a colliding offer is a broken peer.
                if self.awaiting_answer {
                    return Vec::new();
                }
                self.offer_requested = false;
                self.started = true;

                let mut actions = vec![LinkAction::ApplyRemote(SessionDescription::Offer(sdp))];
                self.apply_remote(&mut actions);
                actions.push(LinkAction::CreateAndSendAnswer);
                actions
            }

            LinkInput::RemoteAnswer(sdp) => {
                if !self.awaiting_answer {
                    return Vec::new();
                }
                self.awaiting_answer = false;

                let mut actions = vec![LinkAction::ApplyRemote(SessionDescription::Answer(sdp))];
                self.apply_remote(&mut actions);
                self.resume_renegotiation(&mut actions);
                actions
            }

            LinkInput::RemoteCandidate(candidate) => {
                if self.remote_description_set {
                    vec![LinkAction::ApplyCandidate(candidate)]
                } else {
                    self.pending_ice.push(candidate);
                    Vec::new()
                }
            }

            LinkInput::TransportUp => {
                self.transport_up = true;
                Vec::new()
            }

            LinkInput::TransportInterrupted => {
                self.transport_up = false;
                Vec::new()
            }

            LinkInput::TransportFailed | LinkInput::Close => {
                self.closed = true;
                self.transport_up = false;
                self.pending_ice.clear();
                vec![LinkAction::Teardown]
            }
        }
    }

    fn offer(&mut self) -> Vec<LinkAction> {
        if self.awaiting_answer {
            self.renegotiate_pending = true;
            return Vec::new();
        }
        self.started = true;
        self.awaiting_answer = true;
        vec![LinkAction::CreateAndSendOffer]
    }

    fn apply_remote(&mut self, actions: &mut Vec<LinkAction>) {
        self.remote_description_set = true;
        actions.extend(self.pending_ice.drain(..).map(LinkAction::ApplyCandidate));
    }

    fn resume_renegotiation(&mut self, actions: &mut Vec<LinkAction>) {
        if self.renegotiate_pending {
            self.renegotiate_pending = false;
            self.awaiting_answer = true;
            actions.push(LinkAction::CreateAndSendOffer);
        }
    }
}
