use crate::error::Error;

/// Allocator of resource ids from `resource_id_base` and `resource_id_mask` of connection setup.
#[derive(Debug)]
pub struct Xid {
    base: u32,
    mask: u32,
    inc: u32,
    last: u32,
}

impl Xid {
    pub fn new(base: u32, mask: u32) -> Self {
        Xid { base, mask, inc: mask & mask.wrapping_neg(), last: 0 }
    }

    pub fn next(&mut self) -> Result<u32, Error> {
        if self.inc == 0 || self.last > self.mask - self.inc {
            return Err(Error::IdsExhausted);
        }
        self.last += self.inc;
        Ok(self.base | self.last)
    }
}
