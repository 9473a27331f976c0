#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JitConfig {
    /// Upper bound on guest instructions translated into one block.
    pub max_block_insns: u32,
    /// Blocks never span a `1 << page_shift` byte page of program memory, so a
    /// code write only has to invalidate blocks on the written page.
    pub page_shift: u32,
    /// Number of translated blocks kept before the least recently used one is
    /// dropped.
    pub cache_capacity: usize,
}

impl JitConfig {
    /// Mask selecting the page part of a byte address.
    pub fn page_mask(&self) -> u32 {
        !((1u32 << self.page_shift) - 1)
    }
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            max_block_insns: 512,
            page_shift: 8,
            cache_capacity: 4096,
        }
    }
}
