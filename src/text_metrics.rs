use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use ttf_parser::Face;

static TEXT_MEASURER: Lazy<Mutex<TextMeasurer>> = Lazy::new(|| Mutex::new(TextMeasurer::new()));

const FALLBACK_CHAR_EM: f64 = 0.56;
const FALLBACK_LINE_EM: f64 = 1.2;

// `file` wins over `family` when both are given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontSpec {
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default = "default_font_size")]
    pub size: f64,
}

fn default_font_size() -> f64 {
    12.0
}

impl Default for FontSpec {
    fn default() -> Self {
        Self {
            family: None,
            file: None,
            size: default_font_size(),
        }
    }
}

impl FontSpec {
    pub fn family(name: impl Into<String>, size: f64) -> Self {
        Self {
            family: Some(name.into()),
            file: None,
            size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelSize {
    pub width: f64,
    pub height: f64,
}

impl LabelSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

pub trait TextMeasure {
    fn measure(&self, text: &str, font: &FontSpec) -> LabelSize;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FontMetrics;

impl TextMeasure for FontMetrics {
    fn measure(&self, text: &str, font: &FontSpec) -> LabelSize {
        if text.is_empty() || font.size <= 0.0 {
            return LabelSize::new(0.0, font.size.max(0.0) * FALLBACK_LINE_EM);
        }
        let measured = TEXT_MEASURER
            .lock()
            .ok()
            .and_then(|mut guard| guard.measure(text, font));
        measured.unwrap_or_else(|| FixedMetrics::default().measure(text, font))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedMetrics {
    pub char_width_em: f64,
    pub line_height_em: f64,
}

impl Default for FixedMetrics {
    fn default() -> Self {
        Self {
            char_width_em: FALLBACK_CHAR_EM,
            line_height_em: FALLBACK_LINE_EM,
        }
    }
}

impl TextMeasure for FixedMetrics {
    fn measure(&self, text: &str, font: &FontSpec) -> LabelSize {
        let chars = text.chars().filter(|ch| *ch != '\n').count() as f64;
        LabelSize::new(
            chars * self.char_width_em * font.size,
            self.line_height_em * font.size,
        )
    }
}

struct TextMeasurer {
    db: Database,
    loaded_system_fonts: bool,
    cache: HashMap<String, Option<FontFace>>,
}

impl TextMeasurer {
    fn new() -> Self {
        Self {
            db: Database::new(),
            loaded_system_fonts: false,
            cache: HashMap::new(),
        }
    }

    fn measure(&mut self, text: &str, font: &FontSpec) -> Option<LabelSize> {
        let key = cache_key(font);
        if !self.cache.contains_key(&key) {
            let face = match &font.file {
                Some(path) => load_file_face(path),
                None => self.load_family_face(font.family.as_deref().unwrap_or("sans-serif")),
            };
            if face.is_none() {
                log::debug!("no font face for {key}, using estimated metrics");
            }
            self.cache.insert(key.clone(), face);
        }
        let face = self.cache.get_mut(&key)?.as_mut()?;
        let normalized = text.replace('\t', "    ");
        let width = face.measure_width(&normalized, font.size)?;
        let height = face.line_height(font.size)?;
        Some(LabelSize::new(width, height))
    }

    fn load_family_face(&mut self, font_family: &str) -> Option<FontFace> {
        #[derive(Clone, Copy)]
        enum FamilyToken {
            Generic(Family<'static>),
            Name(usize),
        }

        let mut names: Vec<String> = Vec::new();
        let mut order: Vec<FamilyToken> = Vec::new();
        for part in font_family.split(',') {
            let raw = part.trim().trim_matches('"').trim_matches('\'');
            if raw.is_empty() {
                continue;
            }
            match raw.to_ascii_lowercase().as_str() {
                "serif" => order.push(FamilyToken::Generic(Family::Serif)),
                "sans-serif" | "system-ui" => order.push(FamilyToken::Generic(Family::SansSerif)),
                "monospace" => order.push(FamilyToken::Generic(Family::Monospace)),
                "cursive" => order.push(FamilyToken::Generic(Family::Cursive)),
                "fantasy" => order.push(FamilyToken::Generic(Family::Fantasy)),
                _ => {
                    order.push(FamilyToken::Name(names.len()));
                    names.push(raw.to_string());
                }
            }
        }
        if order.is_empty() {
            order.push(FamilyToken::Generic(Family::SansSerif));
        }

        let families: Vec<Family<'_>> = order
            .into_iter()
            .map(|token| match token {
                FamilyToken::Generic(family) => family,
                FamilyToken::Name(idx) => Family::Name(names[idx].as_str()),
            })
            .collect();

        if !self.loaded_system_fonts {
            self.db.load_system_fonts();
            self.loaded_system_fonts = true;
        }

        let query = Query {
            families: &families,
            weight: Weight::NORMAL,
            stretch: Stretch::Normal,
            style: Style::Normal,
        };
        let id = self.db.query(&query)?;
        self.db
            .with_face_data(id, |data, index| FontFace::new(data.to_vec(), index))
            .flatten()
    }
}

fn cache_key(font: &FontSpec) -> String {
    match (&font.file, font.family.as_deref()) {
        (Some(path), _) => format!("file:{}", path.display()),
        (None, Some(family)) if !family.trim().is_empty() => format!("family:{}", family.trim()),
        _ => "family:sans-serif".to_string(),
    }
}

fn load_file_face(path: &Path) -> Option<FontFace> {
    let bytes = fs::read(path).ok()?;
    FontFace::new(bytes, 0)
}

// `ttf_parser::Face` borrows its data, so it is re-parsed per measurement.
struct FontFace {
    data: Vec<u8>,
    index: u32,
    units_per_em: f64,
    advance_cache: HashMap<char, Option<u16>>,
}

impl FontFace {
    fn new(data: Vec<u8>, index: u32) -> Option<Self> {
        let units_per_em = f64::from(Face::parse(&data, index).ok()?.units_per_em().max(1));
        Some(Self {
            data,
            index,
            units_per_em,
            advance_cache: HashMap::new(),
        })
    }

    fn measure_width(&mut self, text: &str, font_size: f64) -> Option<f64> {
        let face = Face::parse(&self.data, self.index).ok()?;
        let scale = font_size / self.units_per_em;
        let fallback = font_size * FALLBACK_CHAR_EM;
        let mut width = 0.0;
        for ch in text.chars() {
            if ch == '\n' {
                continue;
            }
            let advance = *self.advance_cache.entry(ch).or_insert_with(|| {
                face.glyph_index(ch)
                    .and_then(|glyph| face.glyph_hor_advance(glyph))
            });
            width += match advance {
                Some(advance) if advance > 0 => f64::from(advance) * scale,
                _ => fallback,
            };
        }
        Some(width.max(0.0))
    }

    fn line_height(&self, font_size: f64) -> Option<f64> {
        let face = Face::parse(&self.data, self.index).ok()?;
        let extent = i32::from(face.ascender()) - i32::from(face.descender());
        if extent <= 0 {
            return Some(font_size * FALLBACK_LINE_EM);
        }
        Some(f64::from(extent) * font_size / self.units_per_em)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_metrics_scale_with_font_size() {
        let metrics = FixedMetrics {
            char_width_em: 0.5,
            line_height_em: 1.0,
        };
        let size = metrics.measure("Oakland", &FontSpec::family("serif", 10.0));
        assert_eq!(size, LabelSize::new(35.0, 10.0));
    }

    #[test]
    fn missing_font_file_falls_back_to_estimate() {
        let font = FontSpec {
            family: None,
            file: Some(PathBuf::from("/nonexistent/dymo-test-font.ttf")),
            size: 10.0,
        };
        let size = FontMetrics.measure("abcd", &font);
        let expected = FixedMetrics::default().measure("abcd", &font);
        assert!((size.width - expected.width).abs() < 1e-9);
        assert!((size.height - expected.height).abs() < 1e-9);
    }

    #[test]
    fn cache_key_prefers_file() {
        let font = FontSpec {
            family: Some("Helvetica".to_string()),
            file: Some(PathBuf::from("a.ttf")),
            size: 12.0,
        };
        assert_eq!(cache_key(&font), "file:a.ttf");
        assert_eq!(cache_key(&FontSpec::default()), "family:sans-serif");
    }
}
