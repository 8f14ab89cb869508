/*!

  Match configuration, the JSON contract with the external loader. The engine itself
  never reads files; it is handed a `MatchConfig` with the timing constants, the scoring
  constants, and one entry per warrior. A warrior supplies either a raw byte `image` or
  inline assembly `source`; `source` is assembled at the warrior's load address so its
  labels resolve to the addresses the code will actually occupy.

*/

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::bytecode::assembly::{self, AssemblyError};

#[derive(Deserialize, Clone, Debug)]
pub struct MatchConfig {
  /// Instructions each living player may execute per cycle.
  pub cycles_per_turn: u16,
  /// Match length bound: the total number of player turn slots dealt out before the
  /// match is stopped, even mid-pass over the roster.
  pub max_cycles: u64,
  pub score_for_killing_thread:  u32,
  pub score_for_killing_process: u32,
  /// Awarded per scoring checkpoint, scaled by the player's share of owned RAM.
  pub score_for_owning_ram: f64,
  pub warriors: Vec<WarriorConfig>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct WarriorConfig {
  pub load_address: u16,
  #[serde(default)]
  pub image: Option<Vec<u8>>,
  #[serde(default)]
  pub source: Option<String>,
}

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("malformed configuration: {0}")]
  Json(#[from] serde_json::Error),

  #[error("warrior {0} supplies neither `image` nor `source`")]
  EmptyWarrior(usize),

  #[error("warrior {index}: {source}")]
  Assembly {
    index: usize,
    source: AssemblyError,
  },

  #[error("a match needs at least one warrior")]
  NoWarriors,

  #[error("a match supports at most 255 warriors, got {0}")]
  TooManyWarriors(usize),
}

impl MatchConfig {

  pub fn from_reader(reader: impl Read) -> Result<MatchConfig, ConfigError> {
    Ok(serde_json::from_reader(reader)?)
  }

  pub fn from_path(path: &Path) -> Result<MatchConfig, ConfigError> {
    MatchConfig::from_reader(File::open(path)?)
  }

  /**
    Resolves every warrior to the byte image the game will load: a raw `image` is taken
    as is, a `source` is assembled at the warrior's load address. `image` wins when both
    are given.
  */
  pub fn warrior_images(&self) -> Result<Vec<(u16, Vec<u8>)>, ConfigError> {
    if self.warriors.is_empty() {
      return Err(ConfigError::NoWarriors);
    }
    if self.warriors.len() > u8::max_value() as usize {
      return Err(ConfigError::TooManyWarriors(self.warriors.len()));
    }

    let mut images = Vec::with_capacity(self.warriors.len());
    for (index, warrior) in self.warriors.iter().enumerate() {
      let image = match (&warrior.image, &warrior.source) {

        (Some(image), _) => image.clone(),

        (None, Some(source)) => {
          assembly::assemble(source, warrior.load_address)
            .map_err(|source| ConfigError::Assembly { index, source })?
            .image
        }

        (None, None) => {
          return Err(ConfigError::EmptyWarrior(index));
        }

      };
      images.push((warrior.load_address, image));
    }
    Ok(images)
  }

}
