//! Bounds-checked little-endian reader and writer

use crate::{Result, WireError, MAX_STRING_LEN};
use arbitra_types::{AccountId, Asset};

/// Cursor over an input buffer
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Take `n` bytes, failing before reading past the end
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(WireError::UnexpectedEnd {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> Result<u16> {
        self.array().map(u16::from_le_bytes)
    }

    pub fn u32(&mut self) -> Result<u32> {
        self.array().map(u32::from_le_bytes)
    }

    pub fn u64(&mut self) -> Result<u64> {
        self.array().map(u64::from_le_bytes)
    }

    pub fn i64(&mut self) -> Result<i64> {
        self.array().map(i64::from_le_bytes)
    }

    pub fn bytes32(&mut self) -> Result<[u8; 32]> {
        self.array()
    }

    pub fn bytes64(&mut self) -> Result<[u8; 64]> {
        self.array()
    }

    pub fn tag(&mut self) -> Result<[u8; 8]> {
        self.array()
    }

    pub fn account(&mut self) -> Result<AccountId> {
        self.bytes32().map(AccountId::new)
    }

    pub fn bool(&mut self, field: &'static str) -> Result<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(WireError::InvalidDiscriminant { field, value }),
        }
    }

    /// 4-byte length followed by UTF-8 bytes
    pub fn string(&mut self, field: &'static str) -> Result<String> {
        let len = self.u32()? as usize;
        if len > MAX_STRING_LEN {
            return Err(WireError::LengthTooLarge {
                len,
                max: MAX_STRING_LEN,
            });
        }
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| WireError::InvalidUtf8 { field })
    }

    /// 1-byte presence flag followed by the value when present
    pub fn option<T>(
        &mut self,
        field: &'static str,
        read: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<Option<T>> {
        if self.bool(field)? {
            read(self).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn asset(&mut self) -> Result<Asset> {
        match self.u8()? {
            0 => Ok(Asset::Native),
            1 => self.account().map(Asset::External),
            value => Err(WireError::InvalidDiscriminant {
                field: "asset",
                value,
            }),
        }
    }

    /// Fail if anything is left
    pub fn finish(&self) -> Result<()> {
        match self.remaining() {
            0 => Ok(()),
            count => Err(WireError::TrailingBytes { count }),
        }
    }
}

/// Output buffer
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.buf.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.raw(&v.to_le_bytes())
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.raw(&v.to_le_bytes())
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.raw(&v.to_le_bytes())
    }

    pub fn i64(&mut self, v: i64) -> &mut Self {
        self.raw(&v.to_le_bytes())
    }

    pub fn bool(&mut self, v: bool) -> &mut Self {
        self.u8(v as u8)
    }

    pub fn account(&mut self, v: &AccountId) -> &mut Self {
        self.raw(v.as_bytes())
    }

    pub fn string(&mut self, v: &str) -> &mut Self {
        self.u32(v.len() as u32);
        self.raw(v.as_bytes())
    }

    pub fn option<T>(&mut self, v: Option<T>, write: impl FnOnce(&mut Self, T)) -> &mut Self {
        match v {
            Some(inner) => {
                self.u8(1);
                write(self, inner);
            }
            None => {
                self.u8(0);
            }
        }
        self
    }

    pub fn asset(&mut self, asset: &Asset) -> &mut Self {
        match asset {
            Asset::Native => self.u8(0),
            Asset::External(mint) => self.u8(1).account(mint),
        }
    }
}
