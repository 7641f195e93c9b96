//! Font metrics and embedding.
//!
//! All text is written as single-byte WinAnsi strings. The default faces are
//! the standard Helvetica pair, which every PDF reader provides; a TrueType
//! pair can be embedded instead when configured.

use crate::error::{ReportError, Result};
use pdf_writer::types::FontFlags;
use pdf_writer::{Filter, Name, Pdf, Rect, Ref};
use std::path::{Path, PathBuf};

/// Where the document's two faces come from.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FontSource {
    #[default]
    Helvetica,
    TrueType { regular: PathBuf, bold: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weight {
    Regular,
    Bold,
}

const FIRST_CHAR: u8 = 32;

/// Advance widths (1/1000 em) for ASCII 32..=126.
const HELVETICA_ASCII: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, //
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, //
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, //
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, //
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, //
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

const HELVETICA_BOLD_ASCII: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, //
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, //
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, //
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, //
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, //
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

/// Helvetica widths for the upper half of WinAnsi that narrative text uses.
fn helvetica_upper(byte: u8, weight: Weight) -> u16 {
    let bold = weight == Weight::Bold;
    match byte {
        0x85 | 0x97 => 1000,
        0x91 | 0x92 => if bold { 278 } else { 222 },
        0x93 | 0x94 | 0x84 => if bold { 500 } else { 333 },
        0x95 => 350,
        0x96 => 556,
        0xA0 => 278,
        0xB0 => 400,
        _ => if bold { 611 } else { 556 },
    }
}

const CP1252_SPECIALS: [(char, u8); 27] = [
    ('€', 0x80), ('‚', 0x82), ('ƒ', 0x83), ('„', 0x84), ('…', 0x85), ('†', 0x86),
    ('‡', 0x87), ('ˆ', 0x88), ('‰', 0x89), ('Š', 0x8A), ('‹', 0x8B), ('Œ', 0x8C),
    ('Ž', 0x8E), ('‘', 0x91), ('’', 0x92), ('“', 0x93), ('”', 0x94), ('•', 0x95),
    ('–', 0x96), ('—', 0x97), ('˜', 0x98), ('™', 0x99), ('š', 0x9A), ('›', 0x9B),
    ('œ', 0x9C), ('ž', 0x9E), ('Ÿ', 0x9F),
];

/// Encode text as WinAnsi bytes. Unmappable characters become `?`.
pub fn to_winansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
            '\t' | '\n' | '\r' => b' ',
            _ => CP1252_SPECIALS
                .iter()
                .find(|(ch, _)| *ch == c)
                .map(|(_, b)| *b)
                .unwrap_or(b'?'),
        })
        .collect()
}

fn from_winansi(byte: u8) -> Option<char> {
    match byte {
        0x20..=0x7E | 0xA0..=0xFF => Some(byte as char),
        _ => CP1252_SPECIALS
            .iter()
            .find(|(_, b)| *b == byte)
            .map(|(c, _)| *c),
    }
}

#[derive(Debug)]
enum FaceKind {
    Standard(&'static str),
    Embedded(EmbeddedFace),
}

#[derive(Debug)]
struct EmbeddedFace {
    base_name: String,
    data: Vec<u8>,
    ascent: f32,
    descent: f32,
    cap_height: f32,
    bbox: [f32; 4],
}

/// One face with its WinAnsi width table.
#[derive(Debug)]
pub struct Face {
    pub resource: &'static str,
    widths: Vec<u16>,
    kind: FaceKind,
}

impl Face {
    fn standard(resource: &'static str, base: &'static str, weight: Weight) -> Self {
        let ascii = match weight {
            Weight::Regular => &HELVETICA_ASCII,
            Weight::Bold => &HELVETICA_BOLD_ASCII,
        };
        let widths = (FIRST_CHAR..=255u8)
            .map(|b| match b {
                0x20..=0x7E => ascii[(b - FIRST_CHAR) as usize],
                _ => helvetica_upper(b, weight),
            })
            .collect();
        Self {
            resource,
            widths,
            kind: FaceKind::Standard(base),
        }
    }

    fn true_type(resource: &'static str, path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| {
            ReportError::DocumentAssemblyFailed(format!(
                "font asset {} unavailable: {}",
                path.display(),
                e
            ))
        })?;
        let face = ttf_parser::Face::parse(&data, 0).map_err(|e| {
            ReportError::DocumentAssemblyFailed(format!(
                "font asset {} is not a usable TrueType font: {}",
                path.display(),
                e
            ))
        })?;

        let scale = 1000.0 / face.units_per_em() as f32;
        let notdef = face.glyph_hor_advance(ttf_parser::GlyphId(0)).unwrap_or(0);
        let widths = (FIRST_CHAR..=255u8)
            .map(|b| {
                let advance = from_winansi(b)
                    .and_then(|c| face.glyph_index(c))
                    .and_then(|g| face.glyph_hor_advance(g))
                    .unwrap_or(notdef);
                (advance as f32 * scale).round() as u16
            })
            .collect();

        let bb = face.global_bounding_box();
        let ascent = face.ascender() as f32 * scale;
        let descent = face.descender() as f32 * scale;
        let cap_height = face.capital_height().unwrap_or(face.ascender()) as f32 * scale;
        let bbox = [
            bb.x_min as f32 * scale,
            bb.y_min as f32 * scale,
            bb.x_max as f32 * scale,
            bb.y_max as f32 * scale,
        ];
        let base_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().replace(|c: char| !c.is_ascii_alphanumeric(), ""))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| resource.to_string());

        Ok(Self {
            resource,
            widths,
            kind: FaceKind::Embedded(EmbeddedFace {
                base_name,
                data,
                ascent,
                descent,
                cap_height,
                bbox,
            }),
        })
    }

    /// Rendered width of `text` at `size` points.
    pub fn measure(&self, text: &str, size: f32) -> f32 {
        let units: u32 = to_winansi(text)
            .into_iter()
            .map(|b| self.width_of(b) as u32)
            .sum();
        units as f32 * size / 1000.0
    }

    fn width_of(&self, byte: u8) -> u16 {
        byte.checked_sub(FIRST_CHAR)
            .and_then(|i| self.widths.get(i as usize).copied())
            .unwrap_or(0)
    }

    /// Write the font objects and return the font dictionary ref.
    fn write(&self, pdf: &mut Pdf, alloc: &mut impl FnMut() -> Ref) -> Ref {
        let font_ref = alloc();
        match &self.kind {
            FaceKind::Standard(base) => {
                pdf.type1_font(font_ref)
                    .base_font(Name(base.as_bytes()))
                    .encoding_predefined(Name(b"WinAnsiEncoding"));
            }
            FaceKind::Embedded(face) => {
                let descriptor_ref = alloc();
                let file_ref = alloc();

                let compressed = miniz_oxide::deflate::compress_to_vec_zlib(&face.data, 6);
                let mut file = pdf.stream(file_ref, &compressed);
                file.filter(Filter::FlateDecode);
                file.pair(Name(b"Length1"), face.data.len() as i32);
                drop(file);

                pdf.font_descriptor(descriptor_ref)
                    .name(Name(face.base_name.as_bytes()))
                    .flags(FontFlags::NON_SYMBOLIC)
                    .bbox(Rect::new(face.bbox[0], face.bbox[1], face.bbox[2], face.bbox[3]))
                    .italic_angle(0.0)
                    .ascent(face.ascent)
                    .descent(face.descent)
                    .cap_height(face.cap_height)
                    .stem_v(80.0)
                    .font_file2(file_ref);

                let mut dict = pdf.indirect(font_ref).dict();
                dict.pair(Name(b"Type"), Name(b"Font"));
                dict.pair(Name(b"Subtype"), Name(b"TrueType"));
                dict.pair(Name(b"BaseFont"), Name(face.base_name.as_bytes()));
                dict.pair(Name(b"FirstChar"), FIRST_CHAR as i32);
                dict.pair(Name(b"LastChar"), 255);
                dict.insert(Name(b"Widths"))
                    .array()
                    .items(self.widths.iter().map(|w| *w as i32));
                dict.pair(Name(b"FontDescriptor"), descriptor_ref);
                dict.pair(Name(b"Encoding"), Name(b"WinAnsiEncoding"));
            }
        }
        font_ref
    }
}

/// The regular/bold pair used throughout a document.
#[derive(Debug)]
pub struct FontSet {
    pub regular: Face,
    pub bold: Face,
}

impl FontSet {
    /// Load the faces named by `source`. A configured font file that cannot
    /// be read or parsed is an error; there is no fallback.
    pub fn load(source: &FontSource) -> Result<Self> {
        match source {
            FontSource::Helvetica => Ok(Self {
                regular: Face::standard("F1", "Helvetica", Weight::Regular),
                bold: Face::standard("F2", "Helvetica-Bold", Weight::Bold),
            }),
            FontSource::TrueType { regular, bold } => Ok(Self {
                regular: Face::true_type("F1", regular)?,
                bold: Face::true_type("F2", bold)?,
            }),
        }
    }

    pub fn face(&self, weight: Weight) -> &Face {
        match weight {
            Weight::Regular => &self.regular,
            Weight::Bold => &self.bold,
        }
    }

    /// Write both faces; returns (resource name, ref) pairs for page resources.
    pub fn write(&self, pdf: &mut Pdf, alloc: &mut impl FnMut() -> Ref) -> Vec<(&'static str, Ref)> {
        vec![
            (self.regular.resource, self.regular.write(pdf, alloc)),
            (self.bold.resource, self.bold.write(pdf, alloc)),
        ]
    }
}
