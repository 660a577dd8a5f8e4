// src/state/model.rs

//! States, events and the transition table.
//!
//! The table is a pure function from `(State, Event, AckFlags)` to an
//! optional [`Step`]: the destination state plus the timeout effects that go
//! with it. `None` means the pair is not in the table and the event is a
//! no-op for that state.

use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a document transfer job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum State {
    Parsing,
    Preparing,
    Sending,
    WaitingInfAndBusResponse,
    WaitingInfResponse,
    WaitingBusResponse,
    Failed,
    Succeeded,
}

impl State {
    pub const ALL: [State; 8] = [
        State::Parsing,
        State::Preparing,
        State::Sending,
        State::WaitingInfAndBusResponse,
        State::WaitingInfResponse,
        State::WaitingBusResponse,
        State::Failed,
        State::Succeeded,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, State::Failed | State::Succeeded)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::Parsing => "PARSING",
            State::Preparing => "PREPARING",
            State::Sending => "SENDING",
            State::WaitingInfAndBusResponse => "WAITING_INF_AND_BUS_RESPONSE",
            State::WaitingInfResponse => "WAITING_INF_RESPONSE",
            State::WaitingBusResponse => "WAITING_BUS_RESPONSE",
            State::Failed => "FAILED",
            State::Succeeded => "SUCCEEDED",
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_u8(value: u8) -> Option<State> {
        State::ALL.get(usize::from(value)).copied()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase();
        State::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == wanted)
            .ok_or_else(|| format!("unknown state: {}", s.trim()))
    }
}

/// Which of the four job timeouts an effect or event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutKind {
    Preparation,
    Send,
    InfResponse,
    BusResponse,
}

impl TimeoutKind {
    /// Order in which `process_timeouts` checks the timeouts.
    pub const ALL: [TimeoutKind; 4] = [
        TimeoutKind::Preparation,
        TimeoutKind::Send,
        TimeoutKind::InfResponse,
        TimeoutKind::BusResponse,
    ];

    /// Event raised when this timeout fires.
    pub fn event(self) -> Event {
        match self {
            TimeoutKind::Preparation => Event::DocumentPreparationTimeout,
            TimeoutKind::Send => Event::DocumentSendTimeout,
            TimeoutKind::InfResponse => Event::InfResponseTimeout,
            TimeoutKind::BusResponse => Event::BusResponseTimeout,
        }
    }
}

/// Something that happened to a job, usually observed as an event file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    DocumentParsed,
    DocumentPreparationTimeout,
    DocumentPreparationFailed,
    DocumentPrepared,
    DocumentSendTimeout,
    DocumentSendFailed,
    DocumentSent,
    InfResponseTimeout,
    InfAckReceived,
    InfNackReceived,
    BusAckReceived,
    BusNackReceived,
    BusResponseTimeout,
}

impl Event {
    pub const ALL: [Event; 13] = [
        Event::DocumentParsed,
        Event::DocumentPreparationTimeout,
        Event::DocumentPreparationFailed,
        Event::DocumentPrepared,
        Event::DocumentSendTimeout,
        Event::DocumentSendFailed,
        Event::DocumentSent,
        Event::InfResponseTimeout,
        Event::InfAckReceived,
        Event::InfNackReceived,
        Event::BusAckReceived,
        Event::BusNackReceived,
        Event::BusResponseTimeout,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Event::DocumentParsed => "DOCUMENT_PARSED",
            Event::DocumentPreparationTimeout => "DOCUMENT_PREPARATION_TIMEOUT",
            Event::DocumentPreparationFailed => "DOCUMENT_PREPARATION_FAILED",
            Event::DocumentPrepared => "DOCUMENT_PREPARED",
            Event::DocumentSendTimeout => "DOCUMENT_SEND_TIMEOUT",
            Event::DocumentSendFailed => "DOCUMENT_SEND_FAILED",
            Event::DocumentSent => "DOCUMENT_SENT",
            Event::InfResponseTimeout => "INF_RESPONSE_TIMEOUT",
            Event::InfAckReceived => "INF_ACK_RECEIVED",
            Event::InfNackReceived => "INF_NACK_RECEIVED",
            Event::BusAckReceived => "BUS_ACK_RECEIVED",
            Event::BusNackReceived => "BUS_NACK_RECEIVED",
            Event::BusResponseTimeout => "BUS_RESPONSE_TIMEOUT",
        }
    }

    /// File-name suffix used for this event in a job's `events/` folder.
    ///
    /// Timeout suffixes are only ever written by the job itself, when it
    /// persists a timeout crossing.
    pub fn file_suffix(self) -> &'static str {
        match self {
            Event::DocumentParsed => "document-parsed",
            Event::DocumentPreparationTimeout => "document-preparation-timeout",
            Event::DocumentPreparationFailed => "document-preparation-failed",
            Event::DocumentPrepared => "bus-message-sending",
            Event::DocumentSendTimeout => "document-send-timeout",
            Event::DocumentSendFailed => "bus-message-send-failed",
            Event::DocumentSent => "bus-message-sent",
            Event::InfResponseTimeout => "inf-response-timeout",
            Event::InfAckReceived => "inf-ack-received",
            Event::InfNackReceived => "inf-nack-received",
            Event::BusAckReceived => "bus-ack-received",
            Event::BusNackReceived => "bus-nack-received",
            Event::BusResponseTimeout => "bus-response-timeout",
        }
    }

    pub fn from_file_suffix(suffix: &str) -> Option<Event> {
        Event::ALL
            .iter()
            .copied()
            .find(|event| event.file_suffix() == suffix)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Acknowledgements requested through the job's control files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckFlags {
    pub inf: bool,
    pub bus: bool,
}

/// Timeout side effect of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Start(TimeoutKind),
    Cancel(TimeoutKind),
}

/// Result of a table lookup that changes state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub to: State,
    pub effects: Vec<Effect>,
}

impl Step {
    fn new(to: State, effects: impl Into<Vec<Effect>>) -> Self {
        Self {
            to,
            effects: effects.into(),
        }
    }
}

/// Look up the transition for `event` in state `from`.
///
/// Terminal states absorb every event. Entering a terminal state does not
/// list every cancellation here; the job cancels all timeouts on its own.
pub fn next(from: State, event: Event, acks: AckFlags) -> Option<Step> {
    use Effect::{Cancel, Start};
    use TimeoutKind::{BusResponse, InfResponse, Preparation, Send};

    let step = match (from, event) {
        (State::Parsing, Event::DocumentParsed) => {
            Step::new(State::Preparing, [Start(Preparation)])
        }

        (State::Preparing, Event::DocumentPreparationTimeout)
        | (State::Preparing, Event::DocumentPreparationFailed) => {
            Step::new(State::Failed, [Cancel(Preparation)])
        }
        (State::Preparing, Event::DocumentPrepared) => {
            Step::new(State::Sending, [Cancel(Preparation), Start(Send)])
        }

        (State::Sending, Event::DocumentSendTimeout)
        | (State::Sending, Event::DocumentSendFailed) => Step::new(State::Failed, [Cancel(Send)]),
        (State::Sending, Event::DocumentSent) => match (acks.inf, acks.bus) {
            (true, true) => Step::new(
                State::WaitingInfAndBusResponse,
                [Cancel(Send), Start(InfResponse), Start(BusResponse)],
            ),
            (true, false) => Step::new(
                State::WaitingInfResponse,
                [Cancel(Send), Start(InfResponse)],
            ),
            (false, true) => Step::new(
                State::WaitingBusResponse,
                [Cancel(Send), Start(BusResponse)],
            ),
            (false, false) => Step::new(State::Succeeded, [Cancel(Send)]),
        },

        (State::WaitingInfAndBusResponse, Event::InfAckReceived) => {
            Step::new(State::WaitingBusResponse, [Cancel(InfResponse)])
        }
        (State::WaitingInfAndBusResponse, Event::BusAckReceived) => {
            Step::new(State::WaitingInfResponse, [Cancel(BusResponse)])
        }
        (State::WaitingInfAndBusResponse, Event::InfNackReceived)
        | (State::WaitingInfAndBusResponse, Event::InfResponseTimeout) => {
            Step::new(State::Failed, [Cancel(InfResponse)])
        }
        (State::WaitingInfAndBusResponse, Event::BusNackReceived)
        | (State::WaitingInfAndBusResponse, Event::BusResponseTimeout) => {
            Step::new(State::Failed, [Cancel(BusResponse)])
        }

        (State::WaitingInfResponse, Event::InfAckReceived) => {
            Step::new(State::Succeeded, [Cancel(InfResponse)])
        }
        (State::WaitingInfResponse, Event::InfNackReceived)
        | (State::WaitingInfResponse, Event::InfResponseTimeout) => {
            Step::new(State::Failed, [Cancel(InfResponse)])
        }

        (State::WaitingBusResponse, Event::BusAckReceived) => {
            Step::new(State::Succeeded, [Cancel(BusResponse)])
        }
        (State::WaitingBusResponse, Event::BusNackReceived)
        | (State::WaitingBusResponse, Event::BusResponseTimeout) => {
            Step::new(State::Failed, [Cancel(BusResponse)])
        }

        _ => return None,
    };

    Some(step)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_ACKS: AckFlags = AckFlags {
        inf: false,
        bus: false,
    };

    #[test]
    fn happy_path_through_preparation_and_sending() {
        let step = next(State::Parsing, Event::DocumentParsed, NO_ACKS).unwrap();
        assert_eq!(step.to, State::Preparing);
        assert_eq!(step.effects, vec![Effect::Start(TimeoutKind::Preparation)]);

        let step = next(State::Preparing, Event::DocumentPrepared, NO_ACKS).unwrap();
        assert_eq!(step.to, State::Sending);
        assert_eq!(
            step.effects,
            vec![
                Effect::Cancel(TimeoutKind::Preparation),
                Effect::Start(TimeoutKind::Send)
            ]
        );
    }

    #[test]
    fn document_sent_branches_on_ack_flags() {
        let both = AckFlags {
            inf: true,
            bus: true,
        };
        let inf_only = AckFlags {
            inf: true,
            bus: false,
        };
        let bus_only = AckFlags {
            inf: false,
            bus: true,
        };

        assert_eq!(
            next(State::Sending, Event::DocumentSent, both).unwrap().to,
            State::WaitingInfAndBusResponse
        );
        assert_eq!(
            next(State::Sending, Event::DocumentSent, inf_only).unwrap().to,
            State::WaitingInfResponse
        );
        assert_eq!(
            next(State::Sending, Event::DocumentSent, bus_only).unwrap().to,
            State::WaitingBusResponse
        );

        let step = next(State::Sending, Event::DocumentSent, NO_ACKS).unwrap();
        assert_eq!(step.to, State::Succeeded);
        assert!(!step.effects.iter().any(|e| matches!(e, Effect::Start(_))));
    }

    #[test]
    fn dual_wait_resolves_one_side_at_a_time() {
        let step = next(State::WaitingInfAndBusResponse, Event::BusAckReceived, NO_ACKS).unwrap();
        assert_eq!(step.to, State::WaitingInfResponse);

        let step = next(State::WaitingInfResponse, Event::InfAckReceived, NO_ACKS).unwrap();
        assert_eq!(step.to, State::Succeeded);
    }

    #[test]
    fn events_outside_the_table_are_no_ops() {
        assert!(next(State::Parsing, Event::DocumentSent, NO_ACKS).is_none());
        assert!(next(State::Preparing, Event::DocumentParsed, NO_ACKS).is_none());
        assert!(next(State::WaitingInfResponse, Event::BusAckReceived, NO_ACKS).is_none());
        assert!(next(State::WaitingBusResponse, Event::InfResponseTimeout, NO_ACKS).is_none());
    }

    #[test]
    fn terminal_states_absorb_everything() {
        for from in [State::Failed, State::Succeeded] {
            for event in Event::ALL {
                assert!(next(from, event, AckFlags { inf: true, bus: true }).is_none());
            }
        }
    }

    #[test]
    fn suffix_table_round_trips_for_every_event() {
        for event in Event::ALL {
            assert_eq!(Event::from_file_suffix(event.file_suffix()), Some(event));
        }
        assert_eq!(Event::from_file_suffix("bus-message-sending"), Some(Event::DocumentPrepared));
        assert_eq!(Event::from_file_suffix("unknown"), None);
    }

    #[test]
    fn state_parses_from_config_names() {
        assert_eq!("SUCCEEDED".parse::<State>(), Ok(State::Succeeded));
        assert_eq!(" failed ".parse::<State>(), Ok(State::Failed));
        assert!("DONE".parse::<State>().is_err());
    }

    #[test]
    fn state_round_trips_through_u8() {
        for state in State::ALL {
            assert_eq!(State::from_u8(state.to_u8()), Some(state));
        }
        assert_eq!(State::from_u8(200), None);
    }
}
