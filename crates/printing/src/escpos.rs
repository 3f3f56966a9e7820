//! ESC/POS command builder for thermal receipt printers.

const ESC: u8 = 0x1B;
const GS: u8 = 0x1D;
const LF: u8 = 0x0A;

/// Paper width in characters (font A).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperWidth {
    Mm58,
    Mm80,
}

impl PaperWidth {
    pub fn chars(self) -> usize {
        match self {
            PaperWidth::Mm58 => 32,
            PaperWidth::Mm80 => 48,
        }
    }

    pub fn from_mm(mm: u32) -> Self {
        if mm <= 58 {
            PaperWidth::Mm58
        } else {
            PaperWidth::Mm80
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Center,
    Right,
}

/// Builder for ESC/POS byte buffers.
///
/// ```rust,ignore
/// let mut b = EscPosBuilder::new(PaperWidth::Mm58);
/// b.init().center().bold(true).text("TOKO MAJU").lf().bold(false);
/// b.line_pair("Total", "Rp12.000").feed(3).cut();
/// let bytes = b.build();
/// ```
#[derive(Debug, Clone)]
pub struct EscPosBuilder {
    buffer: Vec<u8>,
    paper: PaperWidth,
}

impl EscPosBuilder {
    pub fn new(paper: PaperWidth) -> Self {
        Self {
            buffer: Vec::with_capacity(512),
            paper,
        }
    }

    pub fn paper(&self) -> PaperWidth {
        self.paper
    }

    /// ESC @: reset the printer.
    pub fn init(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x40]);
        self
    }

    /// ESC t n
    pub fn code_page(&mut self, page: u8) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x74, page]);
        self
    }

    /// ESC E n
    pub fn bold(&mut self, on: bool) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x45, u8::from(on)]);
        self
    }

    /// ESC - n (0 off, 1 thin, 2 thick).
    pub fn underline(&mut self, mode: u8) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x2D, mode.min(2)]);
        self
    }

    /// GS ! n, width and height multipliers 1–8.
    pub fn text_size(&mut self, width: u8, height: u8) -> &mut Self {
        let w = width.clamp(1, 8) - 1;
        let h = height.clamp(1, 8) - 1;
        self.buffer.extend_from_slice(&[GS, 0x21, (w << 4) | h]);
        self
    }

    /// ESC a n
    pub fn align(&mut self, alignment: Alignment) -> &mut Self {
        let n = match alignment {
            Alignment::Left => 0,
            Alignment::Center => 1,
            Alignment::Right => 2,
        };
        self.buffer.extend_from_slice(&[ESC, 0x61, n]);
        self
    }

    pub fn left(&mut self) -> &mut Self {
        self.align(Alignment::Left)
    }

    pub fn center(&mut self) -> &mut Self {
        self.align(Alignment::Center)
    }

    pub fn right(&mut self) -> &mut Self {
        self.align(Alignment::Right)
    }

    /// Printable ASCII passes through; anything else becomes `?`.
    pub fn text(&mut self, s: &str) -> &mut Self {
        self.buffer
            .extend(s.chars().map(|ch| if ch.is_ascii() { ch as u8 } else { b'?' }));
        self
    }

    pub fn lf(&mut self) -> &mut Self {
        self.buffer.push(LF);
        self
    }

    /// Full-width dashed rule.
    pub fn separator(&mut self) -> &mut Self {
        self.buffer
            .extend(std::iter::repeat_n(b'-', self.paper.chars()));
        self.lf()
    }

    /// Label on the left, value flush right, on one line.
    pub fn line_pair(&mut self, label: &str, value: &str) -> &mut Self {
        let used = label.chars().count() + value.chars().count();
        let gap = self.paper.chars().saturating_sub(used).max(1);
        self.text(label);
        self.buffer.extend(std::iter::repeat_n(b' ', gap));
        self.text(value).lf()
    }

    /// ESC d n
    pub fn feed(&mut self, lines: u8) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x64, lines]);
        self
    }

    /// GS V A 16: partial cut after a 16-dot feed.
    pub fn cut(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[GS, 0x56, 0x41, 0x10]);
        self
    }

    /// GS V 0
    pub fn full_cut(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[GS, 0x56, 0x00]);
        self
    }

    /// ESC p 0 25 120: pulse drawer pin 2.
    pub fn open_drawer(&mut self) -> &mut Self {
        self.buffer.extend_from_slice(&[ESC, 0x70, 0x00, 0x19, 0x78]);
        self
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(bytes);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_and_cut_bytes() {
        let mut b = EscPosBuilder::new(PaperWidth::Mm80);
        b.init().cut();
        assert_eq!(b.build(), vec![0x1B, 0x40, 0x1D, 0x56, 0x41, 0x10]);
    }

    #[test]
    fn non_ascii_is_replaced() {
        let mut b = EscPosBuilder::new(PaperWidth::Mm58);
        b.text("Kopi ☕ Susu");
        assert_eq!(b.build(), b"Kopi ? Susu".to_vec());
    }

    #[test]
    fn line_pair_fills_the_paper_width() {
        let mut b = EscPosBuilder::new(PaperWidth::Mm58);
        b.line_pair("Total", "12.000");
        let bytes = b.build();
        assert_eq!(bytes.len(), 33);
        assert_eq!(bytes.last(), Some(&LF));
        assert!(bytes.starts_with(b"Total "));
    }

    #[test]
    fn separator_and_size() {
        let mut b = EscPosBuilder::new(PaperWidth::Mm80);
        b.text_size(2, 2).separator();
        let bytes = b.build();
        assert_eq!(&bytes[..3], &[GS, 0x21, 0x11]);
        assert_eq!(bytes.len(), 3 + 48 + 1);
    }
}
