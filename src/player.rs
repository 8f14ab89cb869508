//! One competitor: a stable pid, the ordered set of its live threads, and its
//! accumulated score. Thread order is significant; it is the round-robin fairness
//! order, and the executed thread always moves to the tail.

use std::collections::VecDeque;

use crate::thread::Thread;

pub struct Player {
  /// 1-based and stable for the match lifetime. Stamp 0 is reserved for unowned RAM.
  pub pid:     u8,
  pub threads: VecDeque<Thread>,
  /// Fractional: the RAM-ownership component accrues in shares of the full space.
  pub score:   f64,
}

impl Player {

  /// A fresh competitor with its single initial thread parked on the warrior's entry
  /// address.
  pub fn new(pid: u8, entry: u16) -> Player {
    let mut threads = VecDeque::new();
    threads.push_back(Thread::new(pid, entry));
    Player {
      pid,
      threads,
      score: 0.0,
    }
  }

  /// A player is eliminated exactly when its active thread set is empty.
  pub fn is_eliminated(&self) -> bool {
    self.threads.is_empty()
  }

  pub fn thread_count(&self) -> usize {
    self.threads.len()
  }

}
