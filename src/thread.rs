//! One warrior's execution context: three general registers, the instruction pointer,
//! and the owning player's pid. A thread is alive exactly as long as it sits in its
//! player's round-robin queue; the scheduler drops it on termination.

use std::fmt::{Display, Formatter};

use crate::register::Register;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Thread {
  pub ax:  u16,
  pub bx:  u16,
  pub cx:  u16,
  /// Wraps mod 2^16 like every other address.
  pub ip:  u16,
  /// The owning player's pid, stamped into the ownership map on every memory write.
  pub pid: u8,
}

impl Thread {

  pub fn new(pid: u8, entry: u16) -> Thread {
    Thread {
      ax:  0,
      bx:  0,
      cx:  0,
      ip:  entry,
      pid,
    }
  }

  /// A sibling thread for the same player: a copy of this thread's registers with a new
  /// instruction pointer.
  pub fn fork(&self, entry: u16) -> Thread {
    Thread { ip: entry, ..*self }
  }

  /// Resolves a register selector to the live value. Operand handles go through this
  /// accessor on every read rather than holding a pointer into the thread.
  pub fn get(&self, register: Register) -> u16 {
    match register {
      Register::Ax => self.ax,
      Register::Bx => self.bx,
      Register::Cx => self.cx,
      Register::Ip => self.ip,
    }
  }

  pub fn set(&mut self, register: Register, value: u16) {
    match register {
      Register::Ax => { self.ax = value; }
      Register::Bx => { self.bx = value; }
      Register::Cx => { self.cx = value; }
      Register::Ip => { self.ip = value; }
    }
  }

}

impl Display for Thread {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "ip={:04X} ax={:04X} bx={:04X} cx={:04X}",
      self.ip, self.ax, self.bx, self.cx
    )
  }
}
