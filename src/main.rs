/*!

  The match runner. It takes one argument, the path to a JSON match configuration,
  streams the match's event log to stdout as JSON lines, and prints the final scoreboard
  and outcome to stderr.

  Exit status: 0 for a completed match, 2 for a configuration problem, 1 when the event
  sink fails mid-match.

*/

#[macro_use] extern crate prettytable;
#[macro_use] extern crate lazy_static;

mod argument;
mod bytecode;
mod config;
mod event;
mod fault;
mod game;
mod memory;
mod player;
mod register;
mod thread;

use std::io::Write;
use std::path::Path;
use std::process;

use crate::config::MatchConfig;
use crate::game::Game;

fn main() {
  env_logger::init();

  let path = match std::env::args().nth(1) {
    Some(path) => path,
    None => {
      eprintln!("usage: coreclash <match.json>");
      process::exit(2);
    }
  };

  let config = match MatchConfig::from_path(Path::new(&path)) {
    Ok(config) => config,
    Err(error) => {
      eprintln!("{}: {}", path, error);
      process::exit(2);
    }
  };

  let mut game = match Game::new(&config) {
    Ok(game) => game,
    Err(error) => {
      eprintln!("{}: {}", path, error);
      process::exit(2);
    }
  };

  let stdout = std::io::stdout();
  let mut sink = stdout.lock();
  match game.run(&mut sink) {
    Ok(outcome) => {
      if let Err(error) = sink.flush() {
        eprintln!("event stream failed: {}", error);
        process::exit(1);
      }
      eprintln!("{}", game);
      eprintln!("{}", outcome);
    }
    Err(error) => {
      eprintln!("event stream failed: {}", error);
      process::exit(1);
    }
  }
}
