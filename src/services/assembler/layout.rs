//! Vertical flow layout for the PDF output.
//!
//! PDF coordinates grow upwards, so the cursor starts at `height - margin` and
//! decreases as blocks are placed. A block that would cross the bottom margin
//! moves to the top of a fresh page.

/// Page size and margins in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
}

impl PageGeometry {
    pub const A4: PageGeometry = PageGeometry {
        width: 595.0,
        height: 842.0,
        margin: 50.0,
    };

    pub fn top(&self) -> f32 {
        self.height - self.margin
    }

    pub fn usable_width(&self) -> f32 {
        self.width - 2.0 * self.margin
    }

    pub fn usable_height(&self) -> f32 {
        self.height - 2.0 * self.margin
    }
}

/// Where a block landed: zero-based page index and the y of its top edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub page: usize,
    pub top: f32,
}

#[derive(Debug, Clone)]
pub struct Paginator {
    geometry: PageGeometry,
    cursor: f32,
    page: usize,
}

impl Paginator {
    pub fn new(geometry: PageGeometry) -> Self {
        Self {
            geometry,
            cursor: geometry.top(),
            page: 0,
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn cursor(&self) -> f32 {
        self.cursor
    }

    /// True when nothing has been placed on the current page yet.
    pub fn at_page_top(&self) -> bool {
        self.cursor >= self.geometry.top()
    }

    pub fn break_page(&mut self) {
        self.page += 1;
        self.cursor = self.geometry.top();
    }

    /// Places a block of `height`, breaking the page first if it would cross
    /// the bottom margin, then advances the cursor by `height + spacing`.
    ///
    /// A block taller than a whole page is placed at the top of a page anyway.
    pub fn place(&mut self, height: f32, spacing: f32) -> Placement {
        if self.cursor - height < self.geometry.margin && !self.at_page_top() {
            self.break_page();
        }
        let placement = Placement {
            page: self.page,
            top: self.cursor,
        };
        self.cursor -= height + spacing;
        placement
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFace {
    Regular,
    Bold,
}

/// Helvetica-Bold runs about this much wider than the regular face.
const BOLD_FACTOR: f32 = 1.08;

/// Approximate Helvetica advance width of `c`, in em.
pub fn glyph_width(c: char, face: FontFace) -> f32 {
    let regular = match c {
        'i' | 'j' | 'l' => 0.222,
        ' ' | 'f' | 't' | 'I' | '.' | ',' | ':' | ';' | '!' | '\'' | '|' => 0.278,
        'r' | '(' | ')' | '-' | '[' | ']' => 0.333,
        'm' | 'M' => 0.833,
        'w' => 0.722,
        'W' => 0.944,
        'A'..='Z' => 0.667,
        'a'..='z' | '0'..='9' => 0.556,
        _ => 0.6,
    };
    match face {
        FontFace::Regular => regular,
        FontFace::Bold => regular * BOLD_FACTOR,
    }
}

/// Estimated rendered width of a single line.
pub fn text_width(text: &str, font_size: f32, face: FontFace) -> f32 {
    text.chars().map(|c| glyph_width(c, face) * font_size).sum()
}

/// Splits `word` after the last character that still fits in `max_width`,
/// keeping at least one character on the left.
fn split_at_width(word: &str, font_size: f32, face: FontFace, max_width: f32) -> (String, String) {
    let mut width = 0.0;
    let mut split = word.len();
    for (i, c) in word.char_indices() {
        width += glyph_width(c, face) * font_size;
        if width > max_width {
            split = i;
            break;
        }
    }
    if split == 0 {
        split = word.chars().next().map_or(word.len(), char::len_utf8);
    }
    (word[..split].to_string(), word[split..].to_string())
}

/// Greedy word wrap against the estimated glyph widths.
pub fn wrap_text(text: &str, font_size: f32, face: FontFace, max_width: f32) -> Vec<String> {
    let space = glyph_width(' ', face) * font_size;
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0.0;

    for word in text.split_whitespace() {
        let mut word = word.to_string();
        let mut word_width = text_width(&word, font_size, face);
        // Words wider than a line are hard-split.
        while word_width > max_width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_width = 0.0;
            }
            let (head, tail) = split_at_width(&word, font_size, face, max_width);
            lines.push(head);
            word = tail;
            word_width = text_width(&word, font_size, face);
        }
        if word.is_empty() {
            continue;
        }

        if !current.is_empty() && current_width + space + word_width > max_width {
            lines.push(std::mem::take(&mut current));
            current_width = 0.0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_width += space;
        }
        current.push_str(&word);
        current_width += word_width;
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_flow_down_the_page() {
        let mut paginator = Paginator::new(PageGeometry::A4);
        let first = paginator.place(100.0, 10.0);
        let second = paginator.place(50.0, 10.0);

        assert_eq!(first, Placement { page: 0, top: 792.0 });
        assert_eq!(second, Placement { page: 0, top: 682.0 });
        assert_eq!(paginator.cursor(), 622.0);
    }

    #[test]
    fn overflowing_block_starts_a_new_page_at_the_top_margin() {
        let mut paginator = Paginator::new(PageGeometry::A4);
        // Usable height is 742; two 300pt blocks fit, the third does not.
        let placements: Vec<_> = (0..4).map(|_| paginator.place(300.0, 10.0)).collect();

        assert_eq!(placements[0], Placement { page: 0, top: 792.0 });
        assert_eq!(placements[1], Placement { page: 0, top: 482.0 });
        assert_eq!(placements[2], Placement { page: 1, top: 792.0 });
        assert_eq!(placements[3], Placement { page: 1, top: 482.0 });
    }

    #[test]
    fn block_ending_exactly_on_the_margin_fits() {
        let mut paginator = Paginator::new(PageGeometry::A4);
        paginator.place(442.0, 0.0);
        // cursor = 350, a 300pt block ends at exactly 50.
        assert_eq!(paginator.place(300.0, 0.0).page, 0);
        assert_eq!(paginator.place(1.0, 0.0).page, 1);
    }

    #[test]
    fn oversized_block_does_not_loop() {
        let mut paginator = Paginator::new(PageGeometry::A4);
        assert_eq!(paginator.place(2000.0, 10.0), Placement { page: 0, top: 792.0 });
        assert_eq!(paginator.place(10.0, 10.0), Placement { page: 1, top: 792.0 });
    }

    #[test]
    fn wrap_respects_estimated_width() {
        let lines = wrap_text("the quick brown fox jumps over", 12.0, FontFace::Regular, 65.0);
        assert_eq!(lines, vec!["the quick", "brown fox", "jumps over"]);
        assert!(
            lines
                .iter()
                .all(|l| text_width(l, 12.0, FontFace::Regular) <= 65.0)
        );
    }

    #[test]
    fn wrap_splits_long_words() {
        let lines = wrap_text("a abcdefghijklmno", 12.0, FontFace::Regular, 30.0);
        assert_eq!(lines, vec!["a", "abcd", "efghij", "klmn", "o"]);
    }

    #[test]
    fn bold_capitals_wrap_within_the_page() {
        let title = "THE GREAT BOOK OF VOLCANOES AND EARTHQUAKES";
        let usable = PageGeometry::A4.usable_width();

        assert!(text_width(title, 24.0, FontFace::Bold) > text_width(title, 24.0, FontFace::Regular));
        let lines = wrap_text(title, 24.0, FontFace::Bold, usable);
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| text_width(l, 24.0, FontFace::Bold) <= usable));
    }

    #[test]
    fn narrow_glyphs_fit_more_per_line() {
        let narrow = "i".repeat(100);
        let wide = "W".repeat(100);
        assert!(text_width(&narrow, 12.0, FontFace::Regular) < text_width(&wide, 12.0, FontFace::Regular) / 4.0);
    }

    #[test]
    fn wrap_of_blank_text_is_empty() {
        assert!(wrap_text("   \n ", 12.0, FontFace::Regular, 100.0).is_empty());
    }
}
