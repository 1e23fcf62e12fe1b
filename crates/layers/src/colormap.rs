//! Attribute value to colour resolution.
//!
//! Every attribute name is associated with a colormap family through
//! [`ColormapConfig`]. Numbers are normalised against the value range of the
//! collection and sampled from a continuous gradient; strings pick a swatch
//! from a categorical palette or, for energy performance classes, from the
//! fixed EPC palette.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use colorous::{Color, Gradient};
use serde_json::Value;

use crate::symbology::{GRAY, Rgb, Rgba, hex_rgb, with_alpha};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequentialMap {
    Viridis,
    Plasma,
    Inferno,
    Magma,
    Cividis,
    Turbo,
    Blues,
    Greens,
    Greys,
    Oranges,
    Purples,
    Reds,
    Rainbow,
    Sinebow,
}

impl SequentialMap {
    pub const ALL: [SequentialMap; 14] = [
        SequentialMap::Viridis,
        SequentialMap::Plasma,
        SequentialMap::Inferno,
        SequentialMap::Magma,
        SequentialMap::Cividis,
        SequentialMap::Turbo,
        SequentialMap::Blues,
        SequentialMap::Greens,
        SequentialMap::Greys,
        SequentialMap::Oranges,
        SequentialMap::Purples,
        SequentialMap::Reds,
        SequentialMap::Rainbow,
        SequentialMap::Sinebow,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SequentialMap::Viridis => "viridis",
            SequentialMap::Plasma => "plasma",
            SequentialMap::Inferno => "inferno",
            SequentialMap::Magma => "magma",
            SequentialMap::Cividis => "cividis",
            SequentialMap::Turbo => "turbo",
            SequentialMap::Blues => "blues",
            SequentialMap::Greens => "greens",
            SequentialMap::Greys => "greys",
            SequentialMap::Oranges => "oranges",
            SequentialMap::Purples => "purples",
            SequentialMap::Reds => "reds",
            SequentialMap::Rainbow => "rainbow",
            SequentialMap::Sinebow => "sinebow",
        }
    }

    fn gradient(self) -> Gradient {
        match self {
            SequentialMap::Viridis => colorous::VIRIDIS,
            SequentialMap::Plasma => colorous::PLASMA,
            SequentialMap::Inferno => colorous::INFERNO,
            SequentialMap::Magma => colorous::MAGMA,
            SequentialMap::Cividis => colorous::CIVIDIS,
            SequentialMap::Turbo => colorous::TURBO,
            SequentialMap::Blues => colorous::BLUES,
            SequentialMap::Greens => colorous::GREENS,
            SequentialMap::Greys => colorous::GREYS,
            SequentialMap::Oranges => colorous::ORANGES,
            SequentialMap::Purples => colorous::PURPLES,
            SequentialMap::Reds => colorous::REDS,
            SequentialMap::Rainbow => colorous::RAINBOW,
            SequentialMap::Sinebow => colorous::SINEBOW,
        }
    }

    /// Samples the gradient at `t`, clamped to `[0, 1]`. NaN samples `0`.
    pub fn sample(self, t: f64) -> Rgb {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        rgb(self.gradient().eval_continuous(t))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoricalPalette {
    Category10,
    Accent,
    Dark2,
    Paired,
    Pastel1,
    Pastel2,
    Set1,
    Set2,
    Set3,
    Tableau10,
}

impl CategoricalPalette {
    pub const ALL: [CategoricalPalette; 10] = [
        CategoricalPalette::Category10,
        CategoricalPalette::Accent,
        CategoricalPalette::Dark2,
        CategoricalPalette::Paired,
        CategoricalPalette::Pastel1,
        CategoricalPalette::Pastel2,
        CategoricalPalette::Set1,
        CategoricalPalette::Set2,
        CategoricalPalette::Set3,
        CategoricalPalette::Tableau10,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CategoricalPalette::Category10 => "category10",
            CategoricalPalette::Accent => "accent",
            CategoricalPalette::Dark2 => "dark2",
            CategoricalPalette::Paired => "paired",
            CategoricalPalette::Pastel1 => "pastel1",
            CategoricalPalette::Pastel2 => "pastel2",
            CategoricalPalette::Set1 => "set1",
            CategoricalPalette::Set2 => "set2",
            CategoricalPalette::Set3 => "set3",
            CategoricalPalette::Tableau10 => "tableau10",
        }
    }

    pub fn colors(self) -> &'static [Color] {
        match self {
            CategoricalPalette::Category10 => &colorous::CATEGORY10,
            CategoricalPalette::Accent => &colorous::ACCENT,
            CategoricalPalette::Dark2 => &colorous::DARK2,
            CategoricalPalette::Paired => &colorous::PAIRED,
            CategoricalPalette::Pastel1 => &colorous::PASTEL1,
            CategoricalPalette::Pastel2 => &colorous::PASTEL2,
            CategoricalPalette::Set1 => &colorous::SET1,
            CategoricalPalette::Set2 => &colorous::SET2,
            CategoricalPalette::Set3 => &colorous::SET3,
            CategoricalPalette::Tableau10 => &colorous::TABLEAU10,
        }
    }

    /// Swatch picked by the first UTF-16 code unit of `value`; `None` for
    /// the empty string.
    pub fn pick(self, value: &str) -> Option<Rgb> {
        let colors = self.colors();
        let unit = value.encode_utf16().next()?;
        colors.get(usize::from(unit) % colors.len()).copied().map(rgb)
    }
}

/// Energy performance certificate classes, best to worst.
pub const EPC_CLASSES: [(&str, u32); 7] = [
    ("A", 0x00FF00),
    ("B", 0x7FFF00),
    ("C", 0xFFFF00),
    ("D", 0xFFD700),
    ("E", 0xFFA500),
    ("F", 0xFF4500),
    ("G", 0xFF0000),
];

pub fn epc_color(class: &str) -> Rgb {
    EPC_CLASSES
        .iter()
        .find(|(name, _)| *name == class)
        .map(|(_, hex)| hex_rgb(*hex))
        .unwrap_or(GRAY)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColormapFamily {
    Sequential(SequentialMap),
    Categorical(CategoricalPalette),
    Epc,
}

impl ColormapFamily {
    pub fn name(self) -> &'static str {
        match self {
            ColormapFamily::Sequential(map) => map.name(),
            ColormapFamily::Categorical(palette) => palette.name(),
            ColormapFamily::Epc => "EPC",
        }
    }
}

impl fmt::Display for ColormapFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown colormap: {0}")]
pub struct UnknownColormap(pub String);

impl FromStr for ColormapFamily {
    type Err = UnknownColormap;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "EPC" {
            return Ok(ColormapFamily::Epc);
        }
        let lower = s.to_ascii_lowercase();
        if let Some(map) = SequentialMap::ALL.iter().find(|m| m.name() == lower) {
            return Ok(ColormapFamily::Sequential(*map));
        }
        CategoricalPalette::ALL
            .iter()
            .find(|p| p.name() == lower)
            .map(|p| ColormapFamily::Categorical(*p))
            .ok_or_else(|| UnknownColormap(s.to_string()))
    }
}

/// Closed value interval used to normalise numeric attributes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Range of the finite values; `[0, 0]` when there are none.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut range: Option<ValueRange> = None;
        for v in values.into_iter().filter(|v| v.is_finite()) {
            range = Some(match range {
                Some(r) => ValueRange::new(r.min.min(v), r.max.max(v)),
                None => ValueRange::new(v, v),
            });
        }
        range.unwrap_or(ValueRange::new(0.0, 0.0))
    }

    /// Interpolation parameter of `value`: `min -> 0`, `max -> 1`, clamped.
    /// A degenerate range or non-finite input yields `0`.
    pub fn normalize(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if !value.is_finite() || !span.is_finite() || span == 0.0 {
            return 0.0;
        }
        ((value - self.min) / span).clamp(0.0, 1.0)
    }
}

/// Attribute name to colormap lookup plus the shared alpha channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ColormapConfig {
    table: BTreeMap<String, ColormapFamily>,
    default_map: SequentialMap,
    default_palette: CategoricalPalette,
    alpha: u8,
}

impl Default for ColormapConfig {
    fn default() -> Self {
        use CategoricalPalette as C;
        use ColormapFamily as F;
        use SequentialMap as S;

        let table = [
            ("height", F::Sequential(S::Viridis)),
            ("floors", F::Sequential(S::Plasma)),
            ("floor_height", F::Sequential(S::Inferno)),
            ("annual_energy", F::Sequential(S::Magma)),
            ("area", F::Sequential(S::Cividis)),
            ("type", F::Categorical(C::Category10)),
            ("status", F::Categorical(C::Accent)),
            ("function", F::Categorical(C::Set2)),
            ("roof_type", F::Categorical(C::Set1)),
            ("EPC_class", F::Epc),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            table,
            default_map: S::Viridis,
            default_palette: C::Category10,
            alpha: 255,
        }
    }
}

impl ColormapConfig {
    pub fn with_attribute(mut self, attribute: impl Into<String>, family: ColormapFamily) -> Self {
        self.table.insert(attribute.into(), family);
        self
    }

    pub fn with_alpha(mut self, alpha: u8) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn alpha(&self) -> u8 {
        self.alpha
    }

    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }

    pub fn family_for(&self, attribute: &str) -> ColormapFamily {
        self.table
            .get(attribute)
            .copied()
            .unwrap_or(ColormapFamily::Sequential(self.default_map))
    }

    pub fn numeric_color(&self, attribute: &str, value: f64, range: ValueRange) -> Rgba {
        let map = match self.family_for(attribute) {
            ColormapFamily::Sequential(map) => map,
            _ => self.default_map,
        };
        with_alpha(map.sample(range.normalize(value)), self.alpha)
    }

    pub fn categorical_color(&self, attribute: &str, value: &str) -> Rgba {
        let rgb = match self.family_for(attribute) {
            ColormapFamily::Epc => epc_color(value),
            ColormapFamily::Categorical(palette) => palette.pick(value).unwrap_or(GRAY),
            ColormapFamily::Sequential(_) => self.default_palette.pick(value).unwrap_or(GRAY),
        };
        with_alpha(rgb, self.alpha)
    }

    /// Colour for a raw JSON property value. Only numbers and strings are
    /// colourable.
    pub fn color_for_value(&self, attribute: &str, value: &Value, range: ValueRange) -> Option<Rgba> {
        match value {
            Value::Number(n) => n.as_f64().map(|v| self.numeric_color(attribute, v, range)),
            Value::String(s) => Some(self.categorical_color(attribute, s)),
            _ => None,
        }
    }
}

fn rgb(c: Color) -> Rgb {
    [c.r, c.g, c.b]
}
