//! Named image operations and their registry.
//!
//! An [`Operation`] is a stateless transform from an [`Image`] plus an ordered
//! [`Args`] list to a new image. The [`OperationRegistry`] maps names to
//! factories and hands out one cached instance per name:
//!
//! | Name | Arguments |
//! |---|---|
//! | `merge` | overlay, left=0, top=0, pct=100 |
//! | `resize` | width?, height?, fit=`inside`, scale=`any` |
//! | `crop` | left, top, width, height |
//! | `autocrop` | margin=0, rgb_threshold=0, pixel_cutoff=1, base_color? |
//! | `rotate` | angle, bg_color?, ignore_transparent=true |
//! | `apply_mask` | mask, left=0, top=0 |
//! | `get_mask` | |
//! | `apply_filter` | filter, up to 4 numbers |
//! | `apply_convolution` | 3x3 matrix, divisor, offset |
//! | `as_grayscale`, `mirror`, `flip` | |
//! | `unsharp` | amount, radius, threshold |
//! | `correct_gamma` | input gamma, output gamma |
//! | `copy_channels` | channel names |
//!
//! Every built-in also exposes a typed function (`resize::resize`, ...) that
//! the registry entry delegates to.

pub mod calculations;
pub mod channels;
pub mod crop;
pub mod filter;
pub mod mask;
pub mod merge;
pub mod resize;
pub mod rotate;
pub mod transform;

use crate::coordinate::Coordinate;
use crate::error::{Error, Result};
use crate::image::Image;
use image::Rgba;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::debug;

/// A named transform. Implementations hold no per-call state.
pub trait Operation: Send + Sync {
    fn execute(&self, image: &Image, args: &Args<'_>) -> Result<Image>;
}

/// Creates the operation instance for one name.
pub type Factory = Box<dyn Fn() -> Arc<dyn Operation> + Send + Sync>;

/// Name → factory table plus the instance cache.
pub struct OperationRegistry {
    factories: RwLock<HashMap<String, Factory>>,
    cache: Mutex<HashMap<String, Arc<dyn Operation>>>,
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl OperationRegistry {
    /// Registry with no operations at all.
    pub fn empty() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_builtins() -> Self {
        let registry = Self::empty();
        registry.register_op("merge", || merge::Merge);
        registry.register_op("resize", || resize::Resize);
        registry.register_op("crop", || crop::Crop);
        registry.register_op("autocrop", || crop::AutoCrop);
        registry.register_op("rotate", || rotate::Rotate);
        registry.register_op("apply_mask", || mask::ApplyMask);
        registry.register_op("get_mask", || mask::GetMask);
        registry.register_op("apply_filter", || filter::ApplyFilter);
        registry.register_op("apply_convolution", || filter::ApplyConvolution);
        registry.register_op("as_grayscale", || filter::AsGrayscale);
        registry.register_op("unsharp", || filter::Unsharp);
        registry.register_op("correct_gamma", || filter::CorrectGamma);
        registry.register_op("mirror", || transform::Mirror);
        registry.register_op("flip", || transform::Flip);
        registry.register_op("copy_channels", || channels::CopyChannels);
        registry
    }

    /// Add (or replace) the factory for `name`. An instance already cached
    /// under that name stays in use.
    pub fn register(&self, name: impl Into<String>, factory: Factory) {
        let name = name.into();
        debug!(operation = %name, "registering operation factory");
        self.factories
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, factory);
    }

    fn register_op<O: Operation + 'static>(&self, name: &str, make: fn() -> O) {
        self.register(name, Box::new(move || Arc::new(make())));
    }

    /// Cached instance for `name`, running its factory on first use.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Operation>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(op) = cache.get(name) {
            return Ok(Arc::clone(op));
        }
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        let factory = factories
            .get(name)
            .ok_or_else(|| Error::UnknownOperation(name.to_string()))?;
        debug!(operation = name, "instantiating operation");
        let op = factory();
        cache.insert(name.to_string(), Arc::clone(&op));
        Ok(op)
    }

    pub fn apply(&self, name: &str, image: &Image, args: &Args<'_>) -> Result<Image> {
        self.resolve(name)?.execute(image, args)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

// ============================================================================
// Arguments
// ============================================================================

/// One operation argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg<'a> {
    /// Explicitly omitted; the operation default applies.
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Coord(Coordinate),
    Color(Rgba<u8>),
    Image(&'a Image),
    Matrix(Vec<f32>),
}

impl Arg<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Arg::Null => "null",
            Arg::Int(_) => "integer",
            Arg::Float(_) => "number",
            Arg::Bool(_) => "boolean",
            Arg::Text(_) => "text",
            Arg::Coord(_) => "coordinate",
            Arg::Color(_) => "color",
            Arg::Image(_) => "image",
            Arg::Matrix(_) => "matrix",
        }
    }
}

macro_rules! arg_from {
    ($($ty:ty => $variant:ident($conv:expr)),* $(,)?) => {
        $(impl From<$ty> for Arg<'_> {
            fn from(v: $ty) -> Self {
                Arg::$variant($conv(v))
            }
        })*
    };
}

arg_from! {
    i64 => Int(|v| v),
    i32 => Int(i64::from),
    u32 => Int(i64::from),
    f64 => Float(|v| v),
    f32 => Float(f64::from),
    bool => Bool(|v| v),
    &str => Text(str::to_string),
    String => Text(|v| v),
    Coordinate => Coord(|v| v),
    Rgba<u8> => Color(|v| v),
    Vec<f32> => Matrix(|v| v),
}

impl<'a> From<&'a Image> for Arg<'a> {
    fn from(image: &'a Image) -> Self {
        Arg::Image(image)
    }
}

impl<'a, T: Into<Arg<'a>>> From<Option<T>> for Arg<'a> {
    fn from(v: Option<T>) -> Self {
        v.map_or(Arg::Null, Into::into)
    }
}

/// Ordered argument list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args<'a>(Vec<Arg<'a>>);

impl<'a> Args<'a> {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Builder-style append.
    pub fn with(mut self, arg: impl Into<Arg<'a>>) -> Self {
        self.0.push(arg.into());
        self
    }

    pub fn push(&mut self, arg: impl Into<Arg<'a>>) {
        self.0.push(arg.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arg<'a>> {
        self.0.get(index)
    }

    /// Typed view that reports conversion failures against `operation`.
    pub fn reader(&self, operation: &'static str) -> ArgReader<'_, 'a> {
        ArgReader {
            operation,
            args: self,
        }
    }
}

impl<'a> From<Vec<Arg<'a>>> for Args<'a> {
    fn from(args: Vec<Arg<'a>>) -> Self {
        Self(args)
    }
}

impl<'a> FromIterator<Arg<'a>> for Args<'a> {
    fn from_iter<I: IntoIterator<Item = Arg<'a>>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Typed accessors over [`Args`]. Missing and `Null` arguments read as `None`;
/// text is parsed into the requested type.
pub struct ArgReader<'r, 'a> {
    operation: &'static str,
    args: &'r Args<'a>,
}

impl<'a> ArgReader<'_, 'a> {
    fn present(&self, index: usize) -> Option<&Arg<'a>> {
        self.args.get(index).filter(|a| !matches!(a, Arg::Null))
    }

    fn mismatch(&self, index: usize, expected: &str, got: &Arg<'_>) -> Error {
        Error::invalid_argument(
            self.operation,
            format!("argument {} must be {expected}, got {}", index + 1, got.kind()),
        )
    }

    fn unparsable(&self, index: usize, expected: &str, text: &str) -> Error {
        Error::invalid_argument(
            self.operation,
            format!("argument {} must be {expected}, got '{text}'", index + 1),
        )
    }

    pub fn image(&self, index: usize) -> Result<&'a Image> {
        match self.present(index) {
            Some(Arg::Image(image)) => Ok(image),
            Some(other) => Err(self.mismatch(index, "an image", other)),
            None => Err(Error::invalid_argument(
                self.operation,
                format!("argument {} (image) is required", index + 1),
            )),
        }
    }

    pub fn coord(&self, index: usize) -> Result<Option<Coordinate>> {
        match self.present(index) {
            None => Ok(None),
            Some(Arg::Coord(c)) => Ok(Some(c.clone())),
            Some(Arg::Int(v)) => Ok(Some(Coordinate::Pixels(*v))),
            Some(Arg::Float(v)) => Ok(Some(Coordinate::Pixels(v.round() as i64))),
            Some(Arg::Text(s)) => Ok(Some(Coordinate::Expr(s.clone()))),
            Some(other) => Err(self.mismatch(index, "a coordinate", other)),
        }
    }

    pub fn coord_or(&self, index: usize, default: impl Into<Coordinate>) -> Result<Coordinate> {
        Ok(self.coord(index)?.unwrap_or_else(|| default.into()))
    }

    pub fn float(&self, index: usize) -> Result<Option<f64>> {
        match self.present(index) {
            None => Ok(None),
            Some(Arg::Int(v)) => Ok(Some(*v as f64)),
            Some(Arg::Float(v)) => Ok(Some(*v)),
            Some(Arg::Bool(v)) => Ok(Some(if *v { 1.0 } else { 0.0 })),
            Some(Arg::Text(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| self.unparsable(index, "a number", s)),
            Some(other) => Err(self.mismatch(index, "a number", other)),
        }
    }

    pub fn float_or(&self, index: usize, default: f64) -> Result<f64> {
        Ok(self.float(index)?.unwrap_or(default))
    }

    pub fn int(&self, index: usize) -> Result<Option<i64>> {
        match self.present(index) {
            Some(Arg::Int(v)) => Ok(Some(*v)),
            Some(Arg::Text(s)) => match s.trim().parse::<i64>() {
                Ok(v) => Ok(Some(v)),
                Err(_) => self.float(index).map(|v| v.map(|f| f.round() as i64)),
            },
            _ => self.float(index).map(|v| v.map(|f| f.round() as i64)),
        }
    }

    pub fn int_or(&self, index: usize, default: i64) -> Result<i64> {
        Ok(self.int(index)?.unwrap_or(default))
    }

    pub fn bool_or(&self, index: usize, default: bool) -> Result<bool> {
        match self.present(index) {
            None => Ok(default),
            Some(Arg::Bool(v)) => Ok(*v),
            Some(Arg::Int(v)) => Ok(*v != 0),
            Some(Arg::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" | "" => Ok(false),
                _ => Err(self.unparsable(index, "a boolean", s)),
            },
            Some(other) => Err(self.mismatch(index, "a boolean", other)),
        }
    }

    pub fn text(&self, index: usize) -> Result<Option<String>> {
        match self.present(index) {
            None => Ok(None),
            Some(Arg::Text(s)) => Ok(Some(s.clone())),
            Some(Arg::Int(v)) => Ok(Some(v.to_string())),
            Some(Arg::Float(v)) => Ok(Some(v.to_string())),
            Some(Arg::Bool(v)) => Ok(Some(v.to_string())),
            Some(other) => Err(self.mismatch(index, "text", other)),
        }
    }

    pub fn color(&self, index: usize) -> Result<Option<Rgba<u8>>> {
        match self.present(index) {
            None => Ok(None),
            Some(Arg::Color(c)) => Ok(Some(*c)),
            Some(Arg::Text(s)) => parse_color(s)
                .map(Some)
                .ok_or_else(|| self.unparsable(index, "a color", s)),
            Some(other) => Err(self.mismatch(index, "a color", other)),
        }
    }

    pub fn matrix(&self, index: usize) -> Result<Option<Vec<f32>>> {
        match self.present(index) {
            None => Ok(None),
            Some(Arg::Matrix(m)) => Ok(Some(m.clone())),
            Some(Arg::Text(s)) => numbers(s)
                .map(Some)
                .ok_or_else(|| self.unparsable(index, "a matrix", s)),
            Some(other) => Err(self.mismatch(index, "a matrix", other)),
        }
    }

    /// Every remaining argument from `start` as text.
    pub fn texts_from(&self, start: usize) -> Result<Vec<String>> {
        (start..self.args.len())
            .filter_map(|i| self.text(i).transpose())
            .collect()
    }

    /// Every remaining argument from `start` as a number.
    pub fn floats_from(&self, start: usize) -> Result<Vec<f64>> {
        (start..self.args.len())
            .filter_map(|i| self.float(i).transpose())
            .collect()
    }
}

/// Parse `#rgb`, `#rrggbb`, `#rrggbbaa` (the `#` is optional) or a list of
/// three or four decimal components separated by commas or spaces.
pub fn parse_color(text: &str) -> Option<Rgba<u8>> {
    let text = text.trim();
    if text.contains([',', ' ']) {
        let parts: Vec<u8> = text
            .split([',', ' '])
            .filter(|p| !p.is_empty())
            .map(|p| p.parse::<u8>().ok())
            .collect::<Option<_>>()?;
        return match parts[..] {
            [r, g, b] => Some(Rgba([r, g, b, 255])),
            [r, g, b, a] => Some(Rgba([r, g, b, a])),
            _ => None,
        };
    }

    let hex = text.strip_prefix('#').unwrap_or(text);
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        3 => {
            let digit = |i: usize| u8::from_str_radix(&hex[i..=i], 16).ok().map(|d| d * 17);
            Some(Rgba([digit(0)?, digit(1)?, digit(2)?, 255]))
        }
        6 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, 255])),
        8 => Some(Rgba([byte(0)?, byte(2)?, byte(4)?, byte(6)?])),
        _ => None,
    }
}

fn numbers(text: &str) -> Option<Vec<f32>> {
    text.split([',', ' ', ';'])
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<f32>().ok())
        .collect()
}
