//! Text wrapping and page composition.

use super::fonts::{to_winansi, FontSet, Weight};
use super::{PageGeometry, PageRole};
use pdf_writer::{Content, Name, Str};

/// Greedy word wrap. Words wider than `max_width` on their own are split
/// at character boundaries.
pub fn wrap_text(text: &str, max_width: f32, measure: impl Fn(&str) -> f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();

    for word in text.split_whitespace() {
        let candidate = if line.is_empty() {
            word.to_string()
        } else {
            format!("{} {}", line, word)
        };
        if measure(&candidate) <= max_width {
            line = candidate;
            continue;
        }
        if !line.is_empty() {
            lines.push(std::mem::take(&mut line));
        }
        if measure(word) <= max_width {
            line = word.to_string();
            continue;
        }
        for ch in word.chars() {
            line.push(ch);
            if measure(&line) > max_width && line.chars().count() > 1 {
                line.pop();
                lines.push(std::mem::take(&mut line));
                line.push(ch);
            }
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

/// Lays content top-down across pages, starting a continuation page
/// whenever the next line would cross the bottom margin.
pub struct PageComposer<'a> {
    fonts: &'a FontSet,
    geometry: PageGeometry,
    pages: Vec<(PageRole, Content)>,
    cursor: f32,
}

impl<'a> PageComposer<'a> {
    pub fn new(fonts: &'a FontSet, geometry: PageGeometry) -> Self {
        Self {
            fonts,
            geometry,
            pages: Vec::new(),
            cursor: geometry.height - geometry.margin,
        }
    }

    pub fn start_page(&mut self, role: PageRole) {
        self.pages.push((role, Content::new()));
        self.cursor = self.geometry.height - self.geometry.margin;
    }

    /// Vertical space left above the bottom margin.
    pub fn remaining(&self) -> f32 {
        self.cursor - self.geometry.bottom_margin
    }

    pub fn cursor(&self) -> f32 {
        self.cursor
    }

    pub fn margin(&self) -> f32 {
        self.geometry.margin
    }

    pub fn text_width(&self) -> f32 {
        self.geometry.width - 2.0 * self.geometry.margin
    }

    pub fn advance(&mut self, height: f32) {
        self.cursor -= height;
    }

    /// Force the next line onto a fresh page.
    pub fn close_page(&mut self) {
        self.cursor = self.geometry.bottom_margin - 1.0;
    }

    fn ensure_room(&mut self, height: f32) {
        if self.pages.is_empty() || self.remaining() < height {
            self.start_page(PageRole::Continuation);
        }
    }

    fn content(&mut self) -> &mut Content {
        if self.pages.is_empty() {
            self.start_page(PageRole::Continuation);
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last].1
    }

    /// Draw one unwrapped line with its top at the cursor.
    pub fn line(&mut self, text: &str, weight: Weight, size: f32, x: f32, leading: f32) {
        self.ensure_room(leading);
        let baseline = self.cursor - size;
        let resource = self.fonts.face(weight).resource;
        let bytes = to_winansi(text);
        self.content()
            .begin_text()
            .set_font(Name(resource.as_bytes()), size)
            .next_line(x, baseline)
            .show(Str(&bytes))
            .end_text();
        self.cursor -= leading;
    }

    /// Draw a line horizontally centred on the page.
    pub fn centered_line(&mut self, text: &str, weight: Weight, size: f32, leading: f32) {
        let width = self.fonts.face(weight).measure(text, size);
        let x = ((self.geometry.width - width) / 2.0).max(self.geometry.margin);
        self.line(text, weight, size, x, leading);
    }

    /// Wrap and draw a block of text starting `indent` points in from the margin.
    pub fn paragraph(&mut self, text: &str, weight: Weight, size: f32, leading: f32, indent: f32) {
        let face = self.fonts.face(weight);
        let lines = wrap_text(text, self.text_width() - indent, |s| face.measure(s, size));
        let x = self.geometry.margin + indent;
        for line in lines {
            self.line(&line, weight, size, x, leading);
        }
    }

    /// A bulleted paragraph with a hanging indent.
    pub fn bullet(&mut self, text: &str, size: f32, leading: f32, indent: f32) {
        let face = self.fonts.face(Weight::Regular);
        let lines = wrap_text(text, self.text_width() - indent, |s| face.measure(s, size));
        for (i, line) in lines.iter().enumerate() {
            if i == 0 {
                self.ensure_room(leading);
                let marker_x = self.geometry.margin + indent / 3.0;
                let top = self.cursor;
                self.line("•", Weight::Regular, size, marker_x, 0.0);
                self.cursor = top;
            }
            self.line(line, Weight::Regular, size, self.geometry.margin + indent, leading);
        }
    }

    /// Place an image XObject with its top-left corner at (`x`, cursor).
    pub fn image(&mut self, resource: &str, x: f32, width: f32, height: f32) {
        let bottom = self.cursor - height;
        let content = self.content();
        content.save_state();
        content.transform([width, 0.0, 0.0, height, x, bottom]);
        content.x_object(Name(resource.as_bytes()));
        content.restore_state();
        self.cursor = bottom;
    }

    /// Grey box with a thin border, used where an image is unavailable.
    pub fn placeholder(&mut self, x: f32, width: f32, height: f32) {
        let bottom = self.cursor - height;
        let content = self.content();
        content.save_state();
        content.set_fill_gray(0.9);
        content.set_stroke_gray(0.6);
        content.set_line_width(0.75);
        content.rect(x, bottom, width, height);
        content.fill_nonzero_and_stroke();
        content.restore_state();
        self.cursor = bottom;
    }

    /// A colour-key row: a filled square followed by one line of text.
    pub fn swatch(&mut self, color: [u8; 3], text: &str, size: f32, leading: f32, indent: f32) {
        self.ensure_room(leading);
        let x = self.geometry.margin + indent;
        let bottom = self.cursor - size;
        let [r, g, b] = color.map(|c| c as f32 / 255.0);
        let content = self.content();
        content.save_state();
        content.set_fill_rgb(r, g, b);
        content.rect(x, bottom, size, size);
        content.fill_nonzero();
        content.restore_state();
        self.line(text, Weight::Regular, size, x + size * 1.6, leading);
    }

    /// Thin rule across the text width.
    pub fn rule(&mut self, gray: f32) {
        let y = self.cursor;
        let (left, right) = (self.geometry.margin, self.geometry.width - self.geometry.margin);
        let content = self.content();
        content.save_state();
        content.set_stroke_gray(gray);
        content.set_line_width(0.5);
        content.move_to(left, y);
        content.line_to(right, y);
        content.stroke();
        content.restore_state();
    }

    pub fn finish(self) -> Vec<(PageRole, Content)> {
        self.pages
    }
}
