/*!

  The match engine: owns the RAM/ownership structure and the player roster, and drives
  the fetch-execute cycle, the round-robin scheduler, and the scoring rules.

  Scheduling is single-threaded and cooperative. A "thread" is a logical execution
  context; exactly one is active at any instant, so the RAM and the ownership map need
  no locking. The scheduler passes over the living players in stable roster order, each
  executing up to `cycles_per_turn` instructions, one per active thread, with the
  executed thread rotating to the tail of its player's queue so forked threads
  interleave fairly. The cycle counter counts turn slots, one per living player's turn,
  and `max_cycles` caps it wherever it runs out, even in the middle of a roster pass.

  Faults never escalate: any fault raised while executing an instruction is caught here,
  at the single-instruction boundary, and terminates exactly the faulting thread. When a
  thread dies, the ownership stamp on its current instruction header attributes the kill:
  a stamp from another player is an unambiguous kill and earns the attacker the
  thread-kill score, plus the process-kill score when it emptied the victim's roster
  slot. An unowned or self-owned stamp credits no one.

*/

use std::fmt::{Display, Formatter};
use std::io::{self, Write};

use log::{debug, info, trace};
use prettytable::{format as TableFormat, Table};

use crate::argument::Argument;
use crate::bytecode;
use crate::bytecode::OpCode;
use crate::config::{ConfigError, MatchConfig};
use crate::event;
use crate::event::{MatchEvent, MatchOutcome, Standing};
use crate::fault::Fault;
use crate::memory::{Memory, RAM_SIZE, UNOWNED};
use crate::player::Player;
use crate::thread::Thread;

/// What a successfully executed instruction asks the scheduler to do with its thread.
enum Step {
  /// Keep the thread; its IP already points at the next instruction.
  Running,
  /// Keep the thread and append a sibling starting at the given address.
  Forked(u16),
  /// The thread executed a halt; retire it.
  Halted,
}

pub struct Game {

  // Match-wide memory: RAM and the ownership map, mutated only through the single
  // active thread's writes.
  memory: Memory,
  cycle:  u64,

  // Constants fixed by configuration at match start.
  cycles_per_turn:           u16,
  max_cycles:                u64,
  score_for_killing_thread:  u32,
  score_for_killing_process: u32,
  score_for_owning_ram:      f64,

  /// Index `i` holds the player with pid `i + 1`; the order is the stable roster order.
  players: Vec<Player>,

}

impl Game {

  // region Construction and accessors

  /**
    Builds a match from its configuration: resolves every warrior image, loads each into
    RAM at its load address (stamping the owner's pid over the loaded footprint), and
    parks one initial thread per warrior on its entry point.
  */
  pub fn new(config: &MatchConfig) -> Result<Game, ConfigError> {
    let images = config.warrior_images()?;
    let mut memory = Memory::new();
    let mut players = Vec::with_capacity(images.len());

    for (index, (load_address, image)) in images.iter().enumerate() {
      let pid = (index + 1) as u8;
      memory.load_image(*load_address, image, pid);
      players.push(Player::new(pid, *load_address));
      debug!(
        "loaded warrior {} at {:04X} ({} bytes)",
        pid, load_address, image.len()
      );
    }

    Ok(Game {
      memory,
      cycle: 0,
      cycles_per_turn:           config.cycles_per_turn,
      max_cycles:                config.max_cycles,
      score_for_killing_thread:  config.score_for_killing_thread,
      score_for_killing_process: config.score_for_killing_process,
      score_for_owning_ram:      config.score_for_owning_ram,
      players,
    })
  }

  pub fn memory(&self) -> &Memory {
    &self.memory
  }

  pub fn players(&self) -> &[Player] {
    &self.players
  }

  pub fn cycle(&self) -> u64 {
    self.cycle
  }

  // endregion

  // region Scheduler

  /**
    Runs the match to completion, streaming events into the sink: turn slots are dealt
    out until `max_cycles` of them are spent (rank by score) or at most one player has
    live threads (victory, or a draw when the last players died in the same roster
    pass).
  */
  pub fn run(&mut self, log: &mut dyn Write) -> io::Result<MatchOutcome> {
    event::emit(log, &MatchEvent::MatchStarted {
      players:         self.players.len() as u8,
      cycles_per_turn: self.cycles_per_turn,
      max_cycles:      self.max_cycles,
    })?;
    info!(
      "match started: {} players, {} instructions per turn, {} cycles max",
      self.players.len(), self.cycles_per_turn, self.max_cycles
    );

    let outcome = 'running: loop {
      //  One roster pass. The cycle budget is consumed one turn slot at a time, so an
      //  exhausted budget halts the match mid-pass; later players get nothing out of a
      //  partial cycle.
      for index in 0..self.players.len() {
        if self.cycle >= self.max_cycles {
          break 'running MatchOutcome::CycleLimit;
        }
        if self.players[index].is_eliminated() {
          continue;
        }
        self.run_turn(index, log)?;
        self.cycle += 1;
      }
      self.checkpoint_ram_scores();
      #[cfg(feature = "trace_execution")] println!("{}", self);

      let living: Vec<u8> = self.players
                                .iter()
                                .filter(|player| !player.is_eliminated())
                                .map(|player| player.pid)
                                .collect();
      match living.len() {
        0 => break MatchOutcome::Draw,
        1 => break MatchOutcome::Victory { winner: living[0] },
        _ => {}
      }
    };

    event::emit(log, &MatchEvent::MatchEnded {
      cycle:     self.cycle,
      outcome,
      standings: self.standings(),
    })?;
    info!("match ended after {} cycles: {}", self.cycle, outcome);
    Ok(outcome)
  }

  /// The final ranking, best score first.
  pub fn standings(&self) -> Vec<Standing> {
    let mut standings: Vec<Standing> =
      self.players
          .iter()
          .map(|player| Standing {
            pid:     player.pid,
            score:   player.score,
            threads: player.thread_count(),
          })
          .collect();
    standings.sort_by(|a, b| {
      b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal)
    });
    standings
  }

  // The RAM-ownership scoring checkpoint, once per full roster pass.
  fn checkpoint_ram_scores(&mut self) {
    let share = self.score_for_owning_ram;
    for index in 0..self.players.len() {
      if self.players[index].is_eliminated() {
        continue;
      }
      let owned = self.memory.owned_count(self.players[index].pid);
      self.players[index].score += share * owned as f64 / RAM_SIZE as f64;
    }
  }

  //  One player's turn: up to `cycles_per_turn` instructions, one per active thread,
  //  cycling through the player's queue.
  fn run_turn(&mut self, index: usize, log: &mut dyn Write) -> io::Result<()> {
    for _ in 0..self.cycles_per_turn {
      let mut thread = match self.players[index].threads.pop_front() {
        Some(thread) => thread,
        None => break,
      };
      let ip = thread.ip;
      let opcode = bytecode::opcode(self.memory.bytes(), ip);

      match self.exec_instruction(&mut thread) {

        Ok(Step::Running) => {
          self.emit_executed(log, thread.pid, ip, opcode)?;
          self.players[index].threads.push_back(thread);
        }

        Ok(Step::Forked(entry)) => {
          self.emit_executed(log, thread.pid, ip, opcode)?;
          debug!("player {} forked a thread at {:04X}", thread.pid, entry);
          let child = thread.fork(entry);
          self.players[index].threads.push_back(thread);
          self.players[index].threads.push_back(child);
        }

        Ok(Step::Halted) => {
          self.emit_executed(log, thread.pid, ip, opcode)?;
          self.retire_thread(index, thread, "halted".to_string(), log)?;
        }

        Err(fault) => {
          self.retire_thread(index, thread, fault.to_string(), log)?;
        }

      }
    }
    Ok(())
  }

  fn emit_executed(
    &self,
    log: &mut dyn Write,
    pid: u8,
    ip: u16,
    opcode: OpCode
  ) -> io::Result<()>
  {
    trace!("cycle {}: pid {} executed {} at {:04X}", self.cycle, pid, opcode, ip);
    event::emit(log, &MatchEvent::InstructionExecuted {
      cycle:  self.cycle,
      pid,
      ip,
      opcode: opcode.into(),
    })
  }

  //  Removes the thread for good (it was already popped from its queue), reports it,
  //  and settles the kill and elimination credits.
  fn retire_thread(
    &mut self,
    index: usize,
    thread: Thread,
    reason: String,
    log: &mut dyn Write
  ) -> io::Result<()>
  {
    let killer = self.attribute_kill(&thread);
    debug!(
      "thread of player {} terminated at {:04X}: {}",
      thread.pid, thread.ip, reason
    );
    event::emit(log, &MatchEvent::ThreadTerminated {
      cycle: self.cycle,
      pid:   thread.pid,
      ip:    thread.ip,
      reason,
      killer,
    })?;

    if let Some(attacker) = killer {
      let points = self.score_for_killing_thread;
      self.credit(attacker, points);
    }

    if self.players[index].is_eliminated() {
      info!("player {} eliminated", thread.pid);
      event::emit(log, &MatchEvent::PlayerEliminated {
        cycle:  self.cycle,
        pid:    thread.pid,
        killer,
      })?;
      if let Some(attacker) = killer {
        let points = self.score_for_killing_process;
        self.credit(attacker, points);
      }
    }
    Ok(())
  }

  /**
    Attributes a thread death by the ownership stamp on the header byte of the
    instruction the thread was executing. A stamp from a different player is an
    unambiguous kill; an unowned or self-owned stamp is ambiguous or self-inflicted and
    credits no one.
  */
  fn attribute_kill(&self, thread: &Thread) -> Option<u8> {
    let stamp = self.memory.owner(thread.ip);
    match stamp != UNOWNED && stamp != thread.pid {
      true  => Some(stamp),
      false => None,
    }
  }

  fn credit(&mut self, pid: u8, points: u32) {
    // Index i holds the player with pid i + 1.
    if let Some(index) = (pid as usize).checked_sub(1) {
      if let Some(player) = self.players.get_mut(index) {
        player.score += points as f64;
      }
    }
  }

  // endregion

  // region Instruction execution

  /**
    The fetch-execute contract for one instruction: decode the header at the thread's
    IP, resolve the operands the opcode needs, apply the effect, then advance the IP by
    the instruction's encoded size unless the opcode set a new IP itself, in which case
    the explicit IP stands. Any fault propagates to the scheduler, which terminates the
    thread.
  */
  fn exec_instruction(&mut self, thread: &mut Thread) -> Result<Step, Fault> {
    let ip = thread.ip;
    let opcode = bytecode::opcode(self.memory.bytes(), ip);
    let next = ip.wrapping_add(bytecode::instruction_size(self.memory.bytes(), ip));

    let step = match opcode {

      OpCode::Mov => {
        let dst = Argument::resolve(thread, &self.memory, 1)?;
        let src = Argument::resolve(thread, &self.memory, 2)?;
        let value = src.read(thread, &self.memory)?;
        dst.write(thread, &mut self.memory, value, src.is_8bit())?;
        Step::Running
      }

      OpCode::Add | OpCode::Sub => {
        let dst = Argument::resolve(thread, &self.memory, 1)?;
        let src = Argument::resolve(thread, &self.memory, 2)?;
        let left  = dst.read(thread, &self.memory)?;
        let right = src.read(thread, &self.memory)?;
        let value = match opcode {
          OpCode::Add => left.wrapping_add(right),
          _           => left.wrapping_sub(right),
        };
        dst.write(thread, &mut self.memory, value, src.is_8bit())?;
        Step::Running
      }

      OpCode::Swp => {
        let first  = Argument::resolve(thread, &self.memory, 1)?;
        let second = Argument::resolve(thread, &self.memory, 2)?;
        first.swap(&second, thread, &mut self.memory)?;
        Step::Running
      }

      OpCode::Jnz => {
        let target    = Argument::resolve(thread, &self.memory, 1)?;
        let condition = Argument::resolve(thread, &self.memory, 2)?;
        match condition.read(thread, &self.memory)? != 0 {
          true => {
            thread.ip = target.read(thread, &self.memory)?;
            return Ok(Step::Running);
          }
          false => Step::Running
        }
      }

      OpCode::Js => {
        let target    = Argument::resolve(thread, &self.memory, 1)?;
        let condition = Argument::resolve(thread, &self.memory, 2)?;
        match condition.sign(thread, &self.memory) {
          true => {
            thread.ip = target.read(thread, &self.memory)?;
            return Ok(Step::Running);
          }
          false => Step::Running
        }
      }

      OpCode::Neg => {
        let target = Argument::resolve(thread, &self.memory, 1)?;
        target.negate(thread, &mut self.memory, target.is_8bit())?;
        Step::Running
      }

      OpCode::Jmp => {
        let target = Argument::resolve(thread, &self.memory, 1)?;
        thread.ip = target.read(thread, &self.memory)?;
        return Ok(Step::Running);
      }

      OpCode::Fork => {
        let entry = Argument::resolve(thread, &self.memory, 1)?
                             .read(thread, &self.memory)?;
        Step::Forked(entry)
      }

      OpCode::Nop => Step::Running,

      OpCode::Hlt => {
        // The IP stays on the halt so attribution sees this instruction's stamp.
        return Ok(Step::Halted);
      }

      OpCode::Illegal => {
        return Err(Fault::IllegalOpcode(self.memory.get(ip) >> 2));
      }

    };

    thread.ip = next;
    Ok(step)
  }

  // endregion

}


lazy_static! {
  static ref TABLE_DISPLAY_FORMAT: TableFormat::TableFormat =
    TableFormat::FormatBuilder::new()
      .column_separator('│')
      .borders(' ')
      .separator(
        TableFormat::LinePosition::Title,
        TableFormat::LineSeparator::new('─', '┼', ' ', ' ')
      )
      .separator(
        TableFormat::LinePosition::Bottom,
        TableFormat::LineSeparator::new('─', '┴', ' ', ' ')
      )
      .padding(1, 1)
      .build();
}

impl Display for Game {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let mut table = Table::new();
    table.set_format(*TABLE_DISPLAY_FORMAT);
    table.set_titles(
      row![ub->"Pid", ub->"Score", ub->"Threads", ub->"Owned", ub->"Thread States"]
    );

    for player in &self.players {
      let states = match player.is_eliminated() {
        true  => "eliminated".to_string(),
        false => {
          player.threads
                .iter()
                .map(|thread| format!("{}", thread))
                .collect::<Vec<String>>()
                .join("; ")
        }
      };
      table.add_row(row![
        r->format!("{}", player.pid),
        r->format!("{:.3}", player.score),
        r->format!("{}", player.thread_count()),
        r->format!("{}", self.memory.owned_count(player.pid)),
        states
      ]);
    }

    write!(f, "Cycle {}\n{}", self.cycle, table)
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::WarriorConfig;

  fn sink() -> Vec<u8> {
    Vec::new()
  }

  fn config_for(sources: &[(u16, &str)], cycles_per_turn: u16, max_cycles: u64) -> MatchConfig {
    MatchConfig {
      cycles_per_turn,
      max_cycles,
      score_for_killing_thread:  5,
      score_for_killing_process: 20,
      score_for_owning_ram:      0.0,
      warriors: sources.iter()
                       .map(|(load_address, source)| WarriorConfig {
                         load_address: *load_address,
                         image:  None,
                         source: Some(source.to_string()),
                       })
                       .collect(),
    }
  }

  fn events(sink: &[u8]) -> Vec<serde_json::Value> {
    std::str::from_utf8(sink)
      .unwrap()
      .lines()
      .map(|line| serde_json::from_str(line).unwrap())
      .collect()
  }

  #[test]
  fn a_register_indirect_write_lands_and_is_stamped() {
    let source = "\
            mov bx, 0x2000\n\
            mov [bx], 0x1234\n\
            mov ax, [bx]\n\
      spin: jmp spin\n";
    let config = config_for(&[(0x0400, source)], 8, 4);
    let mut game = Game::new(&config).unwrap();
    let mut log = sink();
    let outcome = game.run(&mut log).unwrap();

    assert_eq!(outcome, MatchOutcome::Victory { winner: 1 });
    assert_eq!(game.memory().read_word(0x2000), 0x1234);
    assert_eq!(game.memory().owner(0x2000), 1);
    assert_eq!(game.memory().owner(0x2001), 1);
    assert_eq!(game.players()[0].threads[0].ax, 0x1234);
  }

  #[test]
  fn a_one_cycle_match_executes_exactly_one_instruction() {
    let config = config_for(&[(0x0100, "mov ax, 5\nhlt")], 1, 1);
    let mut game = Game::new(&config).unwrap();
    let mut log = sink();
    game.run(&mut log).unwrap();

    let thread = &game.players()[0].threads[0];
    assert_eq!(thread.ax, 5);
    // The mov is 4 bytes; the hlt was never reached.
    assert_eq!(thread.ip, 0x0104);
    let executed = events(&log)
      .iter()
      .filter(|event| event["event"] == "instruction_executed")
      .count();
    assert_eq!(executed, 1);
  }

  #[test]
  fn the_cycle_budget_halts_the_match_mid_roster_pass() {
    //  Two spinning warriors, one instruction per turn, a budget of one turn slot: only
    //  the first player in roster order ever executes, and exactly once.
    let spin = "spin: jmp spin\n";
    let config = config_for(&[(0x0100, spin), (0x0200, spin)], 1, 1);
    let mut game = Game::new(&config).unwrap();
    let mut log = sink();
    let outcome = game.run(&mut log).unwrap();

    assert_eq!(outcome, MatchOutcome::CycleLimit);
    assert_eq!(game.cycle(), 1);
    let log = events(&log);
    let executed: Vec<_> = log.iter()
                              .filter(|event| event["event"] == "instruction_executed")
                              .collect();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0]["pid"], 1);
  }

  #[test]
  fn forked_threads_interleave_fairly_within_a_turn() {
    let source = "\
             fork child\n\
             mov bx, 0x2000\n\
      ploop: add [bx], 1\n\
             jmp ploop\n\
      child: mov bx, 0x3000\n\
      cloop: add [bx], 1\n\
             jmp cloop\n";
    let config = config_for(&[(0x0100, source)], 20, 4);
    let mut game = Game::new(&config).unwrap();
    let mut log = sink();
    game.run(&mut log).unwrap();

    assert_eq!(game.players()[0].thread_count(), 2);
    //  Strict alternation after the fork: the parent bumps its counter 5 times and the
    //  child 4 in the single turn of 20 instructions.
    assert_eq!(game.memory().read_word(0x2000), 5);
    assert_eq!(game.memory().read_word(0x3000), 4);
  }

  #[test]
  fn bombing_an_opponent_attributes_the_kill_and_the_elimination() {
    let attacker = "\
            mov bx, 0x0200\n\
            mov [bx], 0xFC00\n\
      self: jmp self\n";
    let victim = "spin: jmp spin\n";
    let config = config_for(&[(0x0100, attacker), (0x0200, victim)], 4, 16);
    let mut game = Game::new(&config).unwrap();
    let mut log = sink();
    let outcome = game.run(&mut log).unwrap();

    assert_eq!(outcome, MatchOutcome::Victory { winner: 1 });
    assert!(game.players()[1].is_eliminated());
    // Thread kill plus process kill, with the RAM share zeroed in this fixture.
    assert_eq!(game.players()[0].score, 25.0);
    assert_eq!(game.memory().owner(0x0200), 1);

    let log = events(&log);
    let termination = log.iter()
                         .find(|event| event["event"] == "thread_terminated")
                         .unwrap();
    assert_eq!(termination["pid"], 2);
    assert_eq!(termination["killer"], 1);
    let elimination = log.iter()
                         .find(|event| event["event"] == "player_eliminated")
                         .unwrap();
    assert_eq!(elimination["killer"], 1);
  }

  #[test]
  fn a_self_halt_credits_no_one_and_draws_out_the_match() {
    let config = config_for(&[(0x0500, "hlt")], 4, 16);
    let mut game = Game::new(&config).unwrap();
    let mut log = sink();
    let outcome = game.run(&mut log).unwrap();

    assert_eq!(outcome, MatchOutcome::Draw);
    assert!(game.players()[0].is_eliminated());
    assert_eq!(game.players()[0].score, 0.0);

    let log = events(&log);
    let termination = log.iter()
                         .find(|event| event["event"] == "thread_terminated")
                         .unwrap();
    assert_eq!(termination["reason"], "halted");
    assert!(termination["killer"].is_null());
    assert_eq!(log.last().unwrap()["event"], "match_ended");
  }

  #[test]
  fn the_cycle_limit_ranks_players_by_score() {
    //  Both players spin forever; player 2 owns more RAM via a wider footprint, so the
    //  ownership checkpoint ranks it first.
    let small = "spin: jmp spin\n";
    let large = "\
            mov bx, 0x6000\n\
      wide: mov [bx], 0x0101\n\
            add bx, 2\n\
            jmp wide\n";
    let mut config = config_for(&[(0x0100, small), (0x0200, large)], 4, 3);
    config.score_for_owning_ram = 1.0;
    let mut game = Game::new(&config).unwrap();
    let mut log = sink();
    let outcome = game.run(&mut log).unwrap();

    assert_eq!(outcome, MatchOutcome::CycleLimit);
    assert_eq!(game.cycle(), 3);
    let standings = game.standings();
    assert_eq!(standings[0].pid, 2);
    assert!(standings[0].score > standings[1].score);
  }

  #[test]
  fn a_dying_child_does_not_take_down_the_parent() {
    //  The parent forks a child straight into a halt; only the child is retired and the
    //  parent spins on to the win.
    let source = "\
            fork trap\n\
      spin: jmp spin\n\
      trap: hlt\n";
    let config = config_for(&[(0x0100, source)], 8, 8);
    let mut game = Game::new(&config).unwrap();
    let mut log = sink();
    let outcome = game.run(&mut log).unwrap();

    assert_eq!(outcome, MatchOutcome::Victory { winner: 1 });
    assert_eq!(game.players()[0].thread_count(), 1);
    let terminations = events(&log)
      .iter()
      .filter(|event| event["event"] == "thread_terminated")
      .count();
    assert_eq!(terminations, 1);
  }

  #[test]
  fn an_illegal_opcode_is_a_fault_not_a_crash() {
    // 0xFC00 decodes to the unassigned opcode 63.
    let config = MatchConfig {
      cycles_per_turn: 1,
      max_cycles: 4,
      score_for_killing_thread:  5,
      score_for_killing_process: 20,
      score_for_owning_ram:      0.0,
      warriors: vec![WarriorConfig {
        load_address: 0x0100,
        image:  Some(vec![0xFC, 0x00]),
        source: None,
      }],
    };
    let mut game = Game::new(&config).unwrap();
    let mut log = sink();
    let outcome = game.run(&mut log).unwrap();

    assert_eq!(outcome, MatchOutcome::Draw);
    let log = events(&log);
    let termination = log.iter()
                         .find(|event| event["event"] == "thread_terminated")
                         .unwrap();
    assert_eq!(termination["reason"], "illegal opcode 0x3f");
  }

  #[test]
  fn the_ram_checkpoint_accrues_fractionally() {
    let config = {
      let mut config = config_for(&[(0x0100, "spin: jmp spin\n")], 1, 2);
      config.score_for_owning_ram = 2.0;
      config
    };
    let mut game = Game::new(&config).unwrap();
    let mut log = sink();
    game.run(&mut log).unwrap();

    // The loaded image owns 4 bytes; one checkpoint ran before the lone player won.
    let expected = 2.0 * 4.0 / RAM_SIZE as f64;
    assert!((game.players()[0].score - expected).abs() < 1e-12);
  }
}
