//! Faults a warrior can raise while executing. Every fault is caught at the
//! single-instruction boundary and terminates exactly the faulting thread; none of them
//! ever aborts the match.

use thiserror::Error;

#[derive(Error, Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Fault {
  /// An operand was requested by an index outside `{1, 2}`. This indicates a defect in
  /// instruction dispatch, but it is still confined to the thread that hit it.
  #[error("operand index {0} is outside {{1, 2}}")]
  InvalidOperandIndex(u8),

  /// The decoded location code was the NONE sentinel.
  #[error("operand location is NONE")]
  InvalidLocation,

  /// A write was attempted through the instruction-pointer binding.
  #[error("write to the read-only instruction pointer")]
  ReadOnlyViolation,

  /// A read or write went through an operand that never resolved to a target.
  #[error("access through an unresolved operand")]
  InvalidAccess,

  /// The 6 bit code at the instruction header has no assigned semantics.
  #[error("illegal opcode {0:#04x}")]
  IllegalOpcode(u8),
}
