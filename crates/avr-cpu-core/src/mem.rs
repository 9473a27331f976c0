use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Address space of a byte access. Code space is byte-addressed here even though
/// instruction fetch is word-addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemSpace {
    Code,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("bus fault: {space:?} access at {addr:#08x}")]
pub struct BusFault {
    pub space: MemSpace,
    pub addr: u32,
}

impl BusFault {
    pub fn code(addr: u32) -> Self {
        Self {
            space: MemSpace::Code,
            addr,
        }
    }

    pub fn data(addr: u32) -> Self {
        Self {
            space: MemSpace::Data,
            addr,
        }
    }
}

/// Host memory interface seen by the CPU.
///
/// Data addresses are the composed `RAMP:pointer` 24-bit values; the register
/// file and I/O window below `0x60` are handled by [`crate::io`] before a
/// request reaches the bus.
pub trait CpuBus {
    /// Fetches the instruction word at a word address.
    fn fetch(&mut self, word_addr: u32) -> Result<u16, BusFault>;

    fn load(&mut self, space: MemSpace, addr: u32) -> Result<u8, BusFault>;
    fn store(&mut self, space: MemSpace, addr: u32, val: u8) -> Result<(), BusFault>;

    /// `WDR`. Parts without a watchdog ignore it.
    fn watchdog_reset(&mut self) {}

    /// Self-programming write of one code word at byte address `addr`.
    fn spm(&mut self, addr: u32, data: u16) -> Result<(), BusFault> {
        let addr = addr & !1;
        self.store(MemSpace::Code, addr, data as u8)?;
        self.store(MemSpace::Code, addr + 1, (data >> 8) as u8)
    }

    /// One round of the `DES` instruction over `r0..r15` (data in r0..r7, key in
    /// r8..r15). The algorithm is left to the host; the default does nothing.
    fn des_round(&mut self, _regs: &mut [u8; 32], _round: u8, _decrypt: bool) {}
}

/// Flat code + data memory used by tests and small embeddings.
#[derive(Debug, Clone)]
pub struct FlatBus {
    code: Vec<u8>,
    data: Vec<u8>,
    wdr_count: u64,
}

impl FlatBus {
    pub fn new(code_size: usize, data_size: usize) -> Self {
        Self {
            code: vec![0; code_size],
            data: vec![0; data_size],
            wdr_count: 0,
        }
    }

    /// Writes instruction words starting at a word address.
    pub fn load_program(&mut self, word_addr: u32, words: &[u16]) {
        let start = word_addr as usize * 2;
        for (i, word) in words.iter().enumerate() {
            self.code[start + i * 2..start + i * 2 + 2].copy_from_slice(&word.to_le_bytes());
        }
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn wdr_count(&self) -> u64 {
        self.wdr_count
    }

    fn space(&self, space: MemSpace) -> &[u8] {
        match space {
            MemSpace::Code => &self.code,
            MemSpace::Data => &self.data,
        }
    }
}

impl CpuBus for FlatBus {
    fn fetch(&mut self, word_addr: u32) -> Result<u16, BusFault> {
        let lo = self
            .code
            .get(word_addr as usize * 2)
            .copied()
            .ok_or(BusFault::code(word_addr))?;
        let hi = self
            .code
            .get(word_addr as usize * 2 + 1)
            .copied()
            .ok_or(BusFault::code(word_addr))?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    fn load(&mut self, space: MemSpace, addr: u32) -> Result<u8, BusFault> {
        self.space(space)
            .get(addr as usize)
            .copied()
            .ok_or(BusFault { space, addr })
    }

    fn store(&mut self, space: MemSpace, addr: u32, val: u8) -> Result<(), BusFault> {
        let mem = match space {
            MemSpace::Code => &mut self.code,
            MemSpace::Data => &mut self.data,
        };
        let slot = mem
            .get_mut(addr as usize)
            .ok_or(BusFault { space, addr })?;
        *slot = val;
        Ok(())
    }

    fn watchdog_reset(&mut self) {
        self.wdr_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_is_little_endian_words() {
        let mut bus = FlatBus::new(16, 16);
        bus.load_program(1, &[0xe402, 0x0f01]);
        assert_eq!(bus.code()[2..6], [0x02, 0xe4, 0x01, 0x0f]);
        assert_eq!(bus.fetch(1), Ok(0xe402));
        assert_eq!(bus.fetch(2), Ok(0x0f01));
    }

    #[test]
    fn out_of_range_accesses_fault() {
        let mut bus = FlatBus::new(4, 4);
        assert_eq!(bus.fetch(2), Err(BusFault::code(2)));
        assert_eq!(bus.load(MemSpace::Data, 4), Err(BusFault::data(4)));
        assert_eq!(
            bus.store(MemSpace::Code, 9, 0),
            Err(BusFault::code(9))
        );
    }

    #[test]
    fn default_spm_writes_an_aligned_word() {
        let mut bus = FlatBus::new(8, 0);
        bus.spm(5, 0xbeef).unwrap();
        assert_eq!(bus.fetch(2), Ok(0xbeef));
    }
}
