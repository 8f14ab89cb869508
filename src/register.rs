//! An explicit selector for one of a thread's registers. Operand handles carry one of
//! these instead of a pointer into the thread, so a retired thread can never be mutated
//! through a stale handle.

use strum_macros::{Display as StrumDisplay, IntoStaticStr};

#[derive(StrumDisplay, IntoStaticStr, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub enum Register {
  #[strum(serialize = "ax")]
  Ax,
  #[strum(serialize = "bx")]
  Bx,
  #[strum(serialize = "cx")]
  Cx,
  #[strum(serialize = "ip")]
  Ip,
}
