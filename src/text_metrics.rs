//! System-font text measurement shared by every layout pass in the process.

use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Mutex;
use ttf_parser::Face;

static FONT_CACHE: Lazy<Mutex<FontCache>> = Lazy::new(|| Mutex::new(FontCache::new()));

/// Width of the widest line of `text`, or `None` when no usable font is installed.
pub fn measure_text_width(text: &str, font_size: f32, font_family: &str) -> Option<f32> {
    if text.is_empty() || font_size <= 0.0 {
        return Some(0.0);
    }
    let mut cache = FONT_CACHE.lock().ok()?;
    let face = cache.face(font_family)?;
    text.lines()
        .map(|line| face.line_width(line, font_size))
        .try_fold(0.0f32, |widest, line| line.map(|w| widest.max(w)))
}

struct FontCache {
    db: Database,
    system_fonts_loaded: bool,
    faces: HashMap<String, Option<LoadedFace>>,
}

impl FontCache {
    fn new() -> Self {
        Self {
            db: Database::new(),
            system_fonts_loaded: false,
            faces: HashMap::new(),
        }
    }

    fn face(&mut self, font_family: &str) -> Option<&mut LoadedFace> {
        let key = family_key(font_family);
        if !self.faces.contains_key(&key) {
            let loaded = load_cached_face(&key).or_else(|| self.query_face(font_family, &key));
            self.faces.insert(key.clone(), loaded);
        }
        self.faces.get_mut(&key).and_then(Option::as_mut)
    }

    fn query_face(&mut self, font_family: &str, key: &str) -> Option<LoadedFace> {
        let names = family_names(font_family);
        let families: Vec<Family<'_>> = names
            .iter()
            .map(|name| match name.to_ascii_lowercase().as_str() {
                "serif" => Family::Serif,
                "monospace" | "ui-monospace" => Family::Monospace,
                "sans-serif" | "system-ui" | "ui-sans-serif" => Family::SansSerif,
                _ => Family::Name(name.as_str()),
            })
            .collect();

        if !self.system_fonts_loaded {
            self.db.load_system_fonts();
            self.system_fonts_loaded = true;
        }

        let query = Query {
            families: &families,
            weight: Weight::NORMAL,
            stretch: Stretch::Normal,
            style: Style::Normal,
        };
        let id = self.db.query(&query)?;
        self.db
            .with_face_data(id, |data, index| {
                let face = LoadedFace::parse(data.to_vec(), index)?;
                store_cached_face(key, &face);
                Some(face)
            })
            .flatten()
    }
}

/// Font bytes plus precomputed advances; glyphs outside ASCII are resolved lazily.
struct LoadedFace {
    data: Vec<u8>,
    index: u32,
    units_per_em: f32,
    ascii: [u16; 128],
    others: HashMap<char, u16>,
}

impl LoadedFace {
    fn parse(data: Vec<u8>, index: u32) -> Option<Self> {
        let face = Face::parse(&data, index).ok()?;
        let units_per_em = f32::from(face.units_per_em().max(1));
        let mut ascii = [0u16; 128];
        for byte in 0u8..=127 {
            if let Some(glyph) = face.glyph_index(byte as char) {
                ascii[byte as usize] = face.glyph_hor_advance(glyph).unwrap_or(0);
            }
        }
        Some(Self {
            data,
            index,
            units_per_em,
            ascii,
            others: HashMap::new(),
        })
    }

    fn advance(&mut self, ch: char) -> u16 {
        if ch.is_ascii() {
            return self.ascii[ch as usize];
        }
        if let Some(advance) = self.others.get(&ch) {
            return *advance;
        }
        let advance = Face::parse(&self.data, self.index)
            .ok()
            .and_then(|face| {
                let glyph = face.glyph_index(ch)?;
                face.glyph_hor_advance(glyph)
            })
            .unwrap_or(0);
        self.others.insert(ch, advance);
        advance
    }

    fn line_width(&mut self, line: &str, font_size: f32) -> Option<f32> {
        let scale = font_size / self.units_per_em;
        let missing = font_size * 0.56;
        let mut width = 0.0f32;
        for ch in line.chars() {
            let ch = if ch == '\t' { ' ' } else { ch };
            width += match self.advance(ch) {
                0 => missing,
                advance => f32::from(advance) * scale,
            };
        }
        Some(width)
    }
}

fn family_names(font_family: &str) -> Vec<String> {
    let names: Vec<String> = font_family
        .split(',')
        .map(|part| part.trim().trim_matches('"').trim_matches('\'').to_string())
        .filter(|part| !part.is_empty())
        .collect();
    if names.is_empty() {
        vec!["sans-serif".to_string()]
    } else {
        names
    }
}

fn family_key(font_family: &str) -> String {
    family_names(font_family).join(",")
}

fn cache_paths(key: &str) -> Option<(PathBuf, PathBuf)> {
    let base = std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))?;
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    let hash = hasher.finish();
    let dir = base.join("sdfg-layout").join("font-cache");
    Some((dir.join(format!("{hash:x}.font")), dir.join(format!("{hash:x}.meta"))))
}

fn store_cached_face(key: &str, face: &LoadedFace) {
    let Some((font_path, meta_path)) = cache_paths(key) else {
        return;
    };
    if font_path.exists() {
        return;
    }
    if let Some(parent) = font_path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if fs::write(&font_path, &face.data).is_ok() {
        let _ = fs::write(&meta_path, face.index.to_string());
    }
}

fn load_cached_face(key: &str) -> Option<LoadedFace> {
    let (font_path, meta_path) = cache_paths(key)?;
    let index: u32 = fs::read_to_string(meta_path).ok()?.trim().parse().ok()?;
    let bytes = fs::read(font_path).ok()?;
    LoadedFace::parse(bytes, index)
}
