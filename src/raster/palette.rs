//! Palettes and true-color → palette quantisation.
//!
//! Quantisation keeps the exact colors when the image has few enough of them,
//! otherwise it builds a median-cut palette. Dithering is delegated to
//! `image::imageops::dither` through a [`ColorMap`] over the built palette.

use crate::error::{Error, Result};
use image::imageops::{ColorMap, dither, index_colors};
use image::{GrayImage, Rgba, RgbaImage};
use std::collections::HashMap;

pub const MAX_PALETTE_SIZE: usize = 256;

/// Ordered list of at most 256 RGBA entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Palette {
    entries: Vec<Rgba<u8>>,
}

impl Palette {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<Rgba<u8>>) -> Result<Self> {
        if entries.len() > MAX_PALETTE_SIZE {
            return Err(Error::PaletteExhausted(MAX_PALETTE_SIZE));
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Rgba<u8>] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<Rgba<u8>> {
        self.entries.get(index).copied()
    }

    pub fn set(&mut self, index: usize, rgba: Rgba<u8>) {
        if let Some(entry) = self.entries.get_mut(index) {
            *entry = rgba;
        }
    }

    pub fn push(&mut self, rgba: Rgba<u8>) -> Result<u8> {
        if self.entries.len() >= MAX_PALETTE_SIZE {
            return Err(Error::PaletteExhausted(MAX_PALETTE_SIZE));
        }
        self.entries.push(rgba);
        Ok((self.entries.len() - 1) as u8)
    }

    pub fn exact(&self, rgba: Rgba<u8>) -> Option<u8> {
        self.entries.iter().position(|e| *e == rgba).map(|i| i as u8)
    }

    /// Entry with the smallest squared RGBA distance; first wins on ties.
    pub fn closest(&self, rgba: Rgba<u8>) -> Option<u8> {
        self.entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| distance(e, &rgba))
            .map(|(i, _)| i as u8)
    }
}

fn distance(a: &Rgba<u8>, b: &Rgba<u8>) -> u32 {
    a.0.iter()
        .zip(b.0.iter())
        .map(|(&x, &y)| {
            let d = x as i32 - y as i32;
            (d * d) as u32
        })
        .sum()
}

/// Result of [`quantize`].
#[derive(Debug, Clone)]
pub struct Quantized {
    pub palette: Palette,
    pub indices: GrayImage,
    /// Slot reserved for transparent pixels, always the last entry.
    pub transparent: Option<u8>,
}

/// Reduce `image` to a palette of at most `max_colors` opaque entries.
///
/// Pixels with alpha below 128, or equal to `key`, are "clear" and share one
/// extra fully transparent slot appended after the opaque entries. The
/// opaque budget shrinks by one when that slot is needed, never below one.
pub fn quantize(
    image: &RgbaImage,
    key: Option<Rgba<u8>>,
    max_colors: usize,
    dither_pixels: bool,
    match_palette: bool,
) -> Quantized {
    let max_colors = max_colors.clamp(1, MAX_PALETTE_SIZE);

    // Normalise clear pixels so that the key check is alpha alone.
    let mut work = image.clone();
    let mut has_clear = false;
    for px in work.pixels_mut() {
        if is_clear(px, key) {
            px.0[3] = 0;
            has_clear = true;
        }
    }

    let budget = if has_clear {
        max_colors.saturating_sub(1).max(1)
    } else {
        max_colors
    };

    let (counts, order) = histogram(&work);
    let mut entries: Vec<Rgba<u8>> = if order.len() <= budget {
        order.iter().map(|c| Rgba([c[0], c[1], c[2], 255])).collect()
    } else {
        median_cut(&counts, budget)
    };
    if entries.is_empty() {
        // Fully clear image still needs an opaque slot before the key.
        entries.push(Rgba([0, 0, 0, 255]));
    }

    let transparent_slot = has_clear.then(|| {
        let rgb = key.map(|k| [k.0[0], k.0[1], k.0[2]]).unwrap_or([0, 0, 0]);
        entries.push(Rgba([rgb[0], rgb[1], rgb[2], 0]));
        (entries.len() - 1) as u8
    });

    let mut map = PaletteMap::new(&entries, transparent_slot);
    if dither_pixels {
        dither(&mut work, &map);
    }
    let indices = index_colors(&work, &map);

    if match_palette {
        refit(&mut map.entries, &work, &indices, transparent_slot);
    }

    Quantized {
        palette: Palette {
            entries: map.entries,
        },
        indices,
        transparent: transparent_slot,
    }
}

fn is_clear(px: &Rgba<u8>, key: Option<Rgba<u8>>) -> bool {
    px.0[3] < 128 || key.is_some_and(|k| *px == k)
}

/// Opaque RGB counts plus first-occurrence order.
fn histogram(image: &RgbaImage) -> (HashMap<[u8; 3], u32>, Vec<[u8; 3]>) {
    let mut counts: HashMap<[u8; 3], u32> = HashMap::new();
    let mut order = Vec::new();
    for px in image.pixels().filter(|px| px.0[3] != 0) {
        let rgb = [px.0[0], px.0[1], px.0[2]];
        let count = counts.entry(rgb).or_insert(0);
        if *count == 0 {
            order.push(rgb);
        }
        *count += 1;
    }
    (counts, order)
}

fn median_cut(counts: &HashMap<[u8; 3], u32>, budget: usize) -> Vec<Rgba<u8>> {
    let mut colors: Vec<([u8; 3], u32)> = counts.iter().map(|(c, n)| (*c, *n)).collect();
    colors.sort_unstable();
    let mut boxes: Vec<Vec<([u8; 3], u32)>> = vec![colors];

    while boxes.len() < budget {
        let Some((idx, channel)) = widest_box(&boxes) else {
            break;
        };
        let mut bucket = boxes.swap_remove(idx);
        bucket.sort_by_key(|(c, _)| c[channel]);
        let total: u64 = bucket.iter().map(|(_, n)| *n as u64).sum();
        let mut acc = 0u64;
        let mut split = 1;
        for (i, (_, n)) in bucket.iter().enumerate() {
            acc += *n as u64;
            if acc * 2 >= total {
                split = i + 1;
                break;
            }
        }
        let split = split.clamp(1, bucket.len() - 1);
        let upper = bucket.split_off(split);
        boxes.push(bucket);
        boxes.push(upper);
    }

    boxes.iter().map(|b| mean(b)).collect()
}

/// Box with the largest channel range among those that can still split.
fn widest_box(boxes: &[Vec<([u8; 3], u32)>]) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize, u8)> = None;
    for (i, bucket) in boxes.iter().enumerate().filter(|(_, b)| b.len() > 1) {
        for channel in 0..3 {
            let lo = bucket.iter().map(|(c, _)| c[channel]).min().unwrap_or(0);
            let hi = bucket.iter().map(|(c, _)| c[channel]).max().unwrap_or(0);
            let range = hi - lo;
            if best.is_none_or(|(_, _, r)| range > r) {
                best = Some((i, channel, range));
            }
        }
    }
    best.map(|(i, channel, _)| (i, channel))
}

fn mean(bucket: &[([u8; 3], u32)]) -> Rgba<u8> {
    let mut sum = [0u64; 3];
    let mut total = 0u64;
    for (c, n) in bucket {
        for ch in 0..3 {
            sum[ch] += c[ch] as u64 * *n as u64;
        }
        total += *n as u64;
    }
    let total = total.max(1);
    Rgba([
        (sum[0] / total) as u8,
        (sum[1] / total) as u8,
        (sum[2] / total) as u8,
        255,
    ])
}

fn refit(
    entries: &mut [Rgba<u8>],
    image: &RgbaImage,
    indices: &GrayImage,
    transparent: Option<u8>,
) {
    let mut sums = vec![[0u64; 4]; entries.len()];
    for (px, idx) in image.pixels().zip(indices.pixels()) {
        let slot = idx.0[0];
        if Some(slot) == transparent {
            continue;
        }
        let s = &mut sums[slot as usize];
        for ch in 0..3 {
            s[ch] += px.0[ch] as u64;
        }
        s[3] += 1;
    }
    for (entry, s) in entries.iter_mut().zip(sums) {
        if s[3] > 0 {
            *entry = Rgba([
                (s[0] / s[3]) as u8,
                (s[1] / s[3]) as u8,
                (s[2] / s[3]) as u8,
                255,
            ]);
        }
    }
}

/// Nearest-entry lookup used by the dithering and indexing passes.
struct PaletteMap {
    entries: Vec<Rgba<u8>>,
    transparent: Option<u8>,
}

impl PaletteMap {
    fn new(entries: &[Rgba<u8>], transparent: Option<u8>) -> Self {
        Self {
            entries: entries.to_vec(),
            transparent,
        }
    }

    fn opaque(&self) -> &[Rgba<u8>] {
        match self.transparent {
            Some(slot) => &self.entries[..slot as usize],
            None => &self.entries,
        }
    }
}

impl ColorMap for PaletteMap {
    type Color = Rgba<u8>;

    fn index_of(&self, color: &Rgba<u8>) -> usize {
        if let Some(slot) = self.transparent.filter(|_| color.0[3] == 0) {
            return slot as usize;
        }
        let opaque = Rgba([color.0[0], color.0[1], color.0[2], 255]);
        self.opaque()
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| distance(e, &opaque))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    fn map_color(&self, color: &mut Rgba<u8>) {
        if let Some(entry) = self.entries.get(self.index_of(color)) {
            *color = *entry;
        }
    }
}
