//! Wire protocol between clients and the match engine.
//!
//! Every message is an opcode plus an optional JSON payload. Client input is
//! decoded once into [`ClientMessage`]; everything the engine sends is a
//! [`ServerMessage`].

use crate::dispatch::{Envelope, Recipients};
use crate::presence::UserId;
use arena_board::{Board, Mark, Position, WinningLine};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::instrument;

/// Message opcodes and their wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, strum::FromRepr, strum::EnumIter)]
#[repr(u8)]
pub enum OpCode {
    /// A round began.
    #[display("START")]
    Start = 1,
    /// A move was accepted or the turn passed.
    #[display("UPDATE")]
    Update = 2,
    /// The round ended.
    #[display("DONE")]
    Done = 3,
    /// A player requests a cell.
    #[display("MOVE")]
    Move = 4,
    /// The last move was refused.
    #[display("REJECTED")]
    Rejected = 5,
    /// The opponent is gone.
    #[display("OPPONENT_LEFT")]
    OpponentLeft = 6,
}

impl OpCode {
    /// Wire value.
    pub fn value(self) -> u8 {
        self as u8
    }
}

/// MOVE payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveMessage {
    /// Requested cell (0-8).
    pub position: i64,
}

/// START payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartMessage {
    /// Board cells.
    pub board: [Option<Mark>; 9],
    /// Mark of each participant.
    pub marks: BTreeMap<UserId, Mark>,
    /// Whose turn it is.
    pub mark: Mark,
    /// Unix seconds by which the current mover must play.
    pub deadline: i64,
}

/// UPDATE payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMessage {
    /// Board cells.
    pub board: [Option<Mark>; 9],
    /// Whose turn it is.
    pub mark: Mark,
    /// Unix seconds by which the current mover must play.
    pub deadline: i64,
}

/// DONE payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoneMessage {
    /// Final board cells.
    pub board: [Option<Mark>; 9],
    /// Winning mark; `null` for a draw.
    pub winner: Option<Mark>,
    /// The completed line, if the round ended on one.
    pub winner_positions: Option<WinningLine>,
    /// Unix seconds of the next round; 0 when none is scheduled.
    pub next_game_start: i64,
}

impl DoneMessage {
    /// Builds the payload from the final board.
    pub fn new(
        board: &Board,
        winner: Option<Mark>,
        winner_positions: Option<WinningLine>,
        next_game_start: i64,
    ) -> Self {
        Self {
            board: board.cells(),
            winner,
            winner_positions,
            next_game_start,
        }
    }
}

/// Why a client message could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum DecodeError {
    /// No such opcode.
    #[display("Unknown opcode {}", _0)]
    UnknownOpCode(u8),
    /// A server-to-client opcode arrived from a client.
    #[display("Opcode {} is not accepted from clients", _0)]
    UnexpectedOpCode(OpCode),
    /// The payload is not the expected JSON.
    #[display("Malformed payload: {}", _0)]
    Malformed(String),
    /// The position is not on the board.
    #[display("Position {} is outside the board", _0)]
    OutOfRange(i64),
}

impl std::error::Error for DecodeError {}

/// Decoded client input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessage {
    /// Place the sender's mark.
    Move(Position),
}

impl ClientMessage {
    /// Decodes a raw client message.
    #[instrument(skip(data), fields(len = data.len()))]
    pub fn decode(op_code: u8, data: &[u8]) -> Result<Self, DecodeError> {
        let op = OpCode::from_repr(op_code).ok_or(DecodeError::UnknownOpCode(op_code))?;
        match op {
            OpCode::Move => {
                let msg: MoveMessage = serde_json::from_slice(data)
                    .map_err(|e| DecodeError::Malformed(e.to_string()))?;
                usize::try_from(msg.position)
                    .ok()
                    .and_then(Position::from_index)
                    .map(ClientMessage::Move)
                    .ok_or(DecodeError::OutOfRange(msg.position))
            }
            other => Err(DecodeError::UnexpectedOpCode(other)),
        }
    }

    /// Encodes for sending, as a client would.
    pub fn encode(&self) -> Result<(OpCode, Vec<u8>), serde_json::Error> {
        match self {
            ClientMessage::Move(position) => {
                let body = MoveMessage {
                    position: position.to_index() as i64,
                };
                Ok((OpCode::Move, serde_json::to_vec(&body)?))
            }
        }
    }
}

/// Everything the engine sends to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// A round began.
    Start(StartMessage),
    /// A move was accepted or the turn passed.
    Update(UpdateMessage),
    /// The round ended.
    Done(DoneMessage),
    /// The sender's move was refused.
    Rejected,
    /// The opponent left.
    OpponentLeft,
}

impl ServerMessage {
    /// Opcode of this message.
    pub fn op_code(&self) -> OpCode {
        match self {
            ServerMessage::Start(_) => OpCode::Start,
            ServerMessage::Update(_) => OpCode::Update,
            ServerMessage::Done(_) => OpCode::Done,
            ServerMessage::Rejected => OpCode::Rejected,
            ServerMessage::OpponentLeft => OpCode::OpponentLeft,
        }
    }

    /// Serializes into an envelope for the given recipients.
    pub fn encode(&self, recipients: Recipients) -> Result<Envelope, serde_json::Error> {
        let payload = match self {
            ServerMessage::Start(msg) => Some(serde_json::to_string(msg)?),
            ServerMessage::Update(msg) => Some(serde_json::to_string(msg)?),
            ServerMessage::Done(msg) => Some(serde_json::to_string(msg)?),
            ServerMessage::Rejected | ServerMessage::OpponentLeft => None,
        };
        Ok(Envelope::new(self.op_code(), payload, recipients))
    }

    /// Parses an envelope back into a message, as a client would.
    pub fn decode(op_code: OpCode, payload: Option<&str>) -> Result<Self, DecodeError> {
        fn parse<T: serde::de::DeserializeOwned>(payload: Option<&str>) -> Result<T, DecodeError> {
            let body = payload.ok_or_else(|| DecodeError::Malformed("missing payload".into()))?;
            serde_json::from_str(body).map_err(|e| DecodeError::Malformed(e.to_string()))
        }

        match op_code {
            OpCode::Start => parse(payload).map(ServerMessage::Start),
            OpCode::Update => parse(payload).map(ServerMessage::Update),
            OpCode::Done => parse(payload).map(ServerMessage::Done),
            OpCode::Rejected => Ok(ServerMessage::Rejected),
            OpCode::OpponentLeft => Ok(ServerMessage::OpponentLeft),
            OpCode::Move => Err(DecodeError::UnexpectedOpCode(OpCode::Move)),
        }
    }
}
