// No-alloc fmt::Write buffers for URLs, status lines and log text.
//
// StackFmt<N> owns a [u8; N], stops at capacity and remembers that it
// did, so callers that must not send a clipped URL can check
// `truncated()`.

use core::fmt::Write;

pub struct StackFmt<const N: usize> {
    buf: [u8; N],
    len: usize,
    truncated: bool,
}

impl<const N: usize> StackFmt<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0u8; N],
            len: 0,
            truncated: false,
        }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        // only whole &str pieces are copied, except on truncation
        match core::str::from_utf8(&self.buf[..self.len]) {
            Ok(s) => s,
            Err(e) => core::str::from_utf8(&self.buf[..e.valid_up_to()]).unwrap_or(""),
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
        self.truncated = false;
    }
}

impl<const N: usize> Default for StackFmt<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Write for StackFmt<N> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let n = bytes.len().min(N - self.len);
        self.buf[self.len..self.len + n].copy_from_slice(&bytes[..n]);
        self.len += n;
        if n < bytes.len() {
            self.truncated = true;
        }
        Ok(())
    }
}

/// `AA:BB:CC:DD:EE:FF`, the form the render service keys devices by.
pub struct MacDisplay<'a>(pub &'a [u8; 6]);

impl core::fmt::Display for MacDisplay<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_char(':')?;
            }
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

/// Millivolts as `x.yy` volts.
pub struct Volts(pub u16);

impl core::fmt::Display for Volts {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mv = self.0 as u32;
        // round to the nearest centivolt
        let cv = (mv + 5) / 10;
        write!(f, "{}.{:02}", cv / 100, cv % 100)
    }
}

/// Writes `s` with JSON string escaping (no surrounding quotes).
pub struct JsonStr<'a>(pub &'a str);

impl core::fmt::Display for JsonStr<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for c in self.0.chars() {
            match c {
                '"' => f.write_str("\\\"")?,
                '\\' => f.write_str("\\\\")?,
                '\n' => f.write_str("\\n")?,
                '\r' => f.write_str("\\r")?,
                '\t' => f.write_str("\\t")?,
                c if (c as u32) < 0x20 => write!(f, "\\u{:04x}", c as u32)?,
                c => f.write_char(c)?,
            }
        }
        Ok(())
    }
}
