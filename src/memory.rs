/*!

  The shared toroidal RAM together with its ownership map, owned as a single structure
  by the `Game` and passed by reference into the scheduler and every operand resolution.
  All addressing wraps mod 2^16. The ownership map records the pid of the last writer of
  every byte and is mutated only by memory writes; reads never touch it.

*/

/// The RAM is addressed by all valid `u16` values, i.e. 0 to 2^16 - 1.
pub const RAM_SIZE: usize = 0x10000;

/// Ownership stamp meaning no player has written the byte yet.
pub const UNOWNED: u8 = 0;

pub struct Memory {
  bytes:  Vec<u8>,
  owners: Vec<u8>,
}

impl Memory {

  pub fn new() -> Memory {
    Memory {
      bytes:  vec![0u8; RAM_SIZE],
      owners: vec![UNOWNED; RAM_SIZE],
    }
  }

  /// The raw byte store, in the shape the decoder functions consume.
  pub fn bytes(&self) -> &[u8] {
    &self.bytes
  }

  pub fn get(&self, address: u16) -> u8 {
    self.bytes[address as usize]
  }

  /// Writes one byte and stamps the writer's pid over it.
  pub fn set(&mut self, address: u16, value: u8, pid: u8) {
    self.bytes[address as usize] = value;
    self.owners[address as usize] = pid;
  }

  /// Big-endian 16 bit load: high byte at `address`, low byte at `address + 1`, both
  /// mod 2^16. A load spanning the top of RAM wraps around to address 0.
  pub fn read_word(&self, address: u16) -> u16 {
    let high = self.get(address) as u16;
    let low  = self.get(address.wrapping_add(1)) as u16;
    (high << 8) | low
  }

  /// Big-endian 16 bit store across `address` and `address + 1` mod 2^16. Both bytes
  /// are stamped with the writer's pid.
  pub fn write_word(&mut self, address: u16, value: u16, pid: u8) {
    self.set(address, (value >> 8) as u8, pid);
    self.set(address.wrapping_add(1), value as u8, pid);
  }

  pub fn owner(&self, address: u16) -> u8 {
    self.owners[address as usize]
  }

  /// Copies a warrior image into RAM at its load address, stamping the owner's pid over
  /// the loaded footprint. The copy wraps like any other write.
  pub fn load_image(&mut self, address: u16, image: &[u8], pid: u8) {
    for (offset, byte) in image.iter().enumerate() {
      self.set(address.wrapping_add(offset as u16), *byte, pid);
    }
  }

  /// The number of bytes currently stamped with the given pid.
  pub fn owned_count(&self, pid: u8) -> usize {
    self.owners.iter().filter(|owner| **owner == pid).count()
  }

}
