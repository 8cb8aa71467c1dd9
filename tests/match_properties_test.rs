//! Property tests driving a running match with arbitrary move batches.

mod common;

use arena_board::round_result;
use common::{Harness, decode, move_msg, presence};
use proptest::prelude::*;
use tictactoe_arena::{
    Board, EngineConfig, Flow, Mark, OpCode, Position, Recipients, ServerMessage, Square,
};

const SENDERS: [&str; 3] = ["alice", "bob", "mallory"];

/// Batches of (sender index, raw position), including positions off the
/// board and a sender who is not playing.
fn batches() -> impl Strategy<Value = Vec<Vec<(usize, i64)>>> {
    prop::collection::vec(
        prop::collection::vec((0..SENDERS.len(), -2i64..11), 1..5),
        1..15,
    )
}

fn mark_of(user: &str) -> Option<Mark> {
    match user {
        "alice" => Some(Mark::X),
        "bob" => Some(Mark::O),
        _ => None,
    }
}

proptest! {
    #[test]
    fn arbitrary_batches_alternate_turns_and_never_overwrite(batches in batches()) {
        let mut h = Harness::playing(EngineConfig::default(), false);
        let mut model = Board::new();
        let mut turn = Mark::X;
        let mut finished = false;

        for batch in batches {
            let messages = batch
                .iter()
                .map(|(sender, raw)| move_msg(SENDERS[*sender], *raw))
                .collect();
            let flow = h.tick(messages);
            let envelopes = h.drain();
            let mut envelopes = envelopes.iter();

            for (sender, raw) in &batch {
                if finished {
                    break;
                }
                let user = SENDERS[*sender];
                let envelope = envelopes.next();
                prop_assert!(envelope.is_some(), "every message gets an answer");
                let Some(envelope) = envelope else { break };

                let accepted = usize::try_from(*raw)
                    .ok()
                    .and_then(Position::from_index)
                    .filter(|position| mark_of(user) == Some(turn) && model.is_empty(*position));

                let Some(position) = accepted else {
                    prop_assert_eq!(envelope.op_code(), &OpCode::Rejected);
                    prop_assert_eq!(envelope.recipients(), &Recipients::one(presence(user)));
                    continue;
                };

                model.set(position, Square::Occupied(turn));
                prop_assert_eq!(envelope.recipients(), &Recipients::All);
                match decode(envelope) {
                    ServerMessage::Update(update) => {
                        prop_assert_eq!(update.board, model.cells());
                        prop_assert_eq!(update.mark, turn.opponent());
                        prop_assert!(!round_result(&model, turn).0.is_terminal());
                    }
                    ServerMessage::Done(done) => {
                        prop_assert_eq!(done.board, model.cells());
                        prop_assert!(round_result(&model, turn).0.is_terminal());
                        prop_assert_eq!(flow, Flow::Terminate);
                        finished = true;
                    }
                    other => prop_assert!(false, "unexpected answer {:?}", other),
                }
                turn = turn.opponent();
            }

            prop_assert!(envelopes.next().is_none(), "no answer without a message");
            let board = h.core.state().board().as_ref().map(Board::cells);
            prop_assert_eq!(board, Some(model.cells()));

            let reports = h.reporter.reports().len();
            if finished {
                prop_assert_eq!(reports, 1);
                break;
            }
            prop_assert_eq!(reports, 0);
            prop_assert_eq!(flow, Flow::Continue);
            prop_assert_eq!(*h.core.state().mark(), turn);
        }
    }
}
