/*!

  Structured match events, the contract with the output sink. The engine reports every
  executed instruction, every thread and player death, and the final result; the sink is
  any `io::Write`, and events are serialized as one JSON object per line.

*/

use std::fmt::{Display, Formatter};
use std::io::{self, Write};

use serde::Serialize;

#[derive(Serialize, Clone, PartialEq, Debug)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MatchEvent {
  MatchStarted {
    players:         u8,
    cycles_per_turn: u16,
    max_cycles:      u64,
  },
  InstructionExecuted {
    cycle:  u64,
    pid:    u8,
    ip:     u16,
    opcode: &'static str,
  },
  ThreadTerminated {
    cycle:  u64,
    pid:    u8,
    ip:     u16,
    reason: String,
    /// The attributed attacker, when attribution is unambiguous.
    killer: Option<u8>,
  },
  PlayerEliminated {
    cycle:  u64,
    pid:    u8,
    killer: Option<u8>,
  },
  MatchEnded {
    cycle:     u64,
    outcome:   MatchOutcome,
    standings: Vec<Standing>,
  },
}

/// How the match ended.
#[derive(Serialize, Copy, Clone, Eq, PartialEq, Debug)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchOutcome {
  /// Exactly one player still had live threads.
  Victory { winner: u8 },
  /// The remaining players lost their last threads in the same cycle.
  Draw,
  /// `max_cycles` was exhausted; the standings rank by score.
  CycleLimit,
}

impl Display for MatchOutcome {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      MatchOutcome::Victory { winner } => {
        write!(f, "player {} wins", winner)
      }
      MatchOutcome::Draw => {
        write!(f, "draw")
      }
      MatchOutcome::CycleLimit => {
        write!(f, "cycle limit reached")
      }
    }
  }
}

/// One row of the final ranking.
#[derive(Serialize, Clone, PartialEq, Debug)]
pub struct Standing {
  pub pid:     u8,
  pub score:   f64,
  pub threads: usize,
}

/// Writes one event to the sink as a JSON line.
pub fn emit(sink: &mut dyn Write, event: &MatchEvent) -> io::Result<()> {
  serde_json::to_writer(&mut *sink, event)?;
  sink.write_all(b"\n")
}
