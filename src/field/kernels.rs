//! CPU kernels of the field stages.
//!
//! Each kernel samples its inputs the way the matching fragment pass does:
//! texel centers at `(i + 0.5) / size`, bilinear filtering, clamp to edge.

use glam::Vec2;

use super::{FieldTexture, BLEND_WEIGHTS, CASCADE_LEVELS, MIN_GRADIENT};

/// Square single-channel float image, row 0 at the top.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    size: u32,
    data: Vec<f32>,
}

impl Plane {
    pub fn new(size: u32) -> Self {
        Self {
            size,
            data: vec![0.0; (size * size) as usize],
        }
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn get(&self, x: i32, y: i32) -> f32 {
        let max = self.size as i32 - 1;
        self.data[(y.clamp(0, max) * self.size as i32 + x.clamp(0, max)) as usize]
    }

    #[inline]
    fn put(&mut self, x: u32, y: u32, value: f32) {
        let size = self.size;
        self.data[(y * size + x) as usize] = value;
    }

    /// Bilinear sample, clamp to edge.
    pub fn sample(&self, uv: Vec2) -> f32 {
        let t = uv * self.size as f32 - Vec2::splat(0.5);
        let base = t.floor();
        let f = t - base;
        let (x, y) = (base.x as i32, base.y as i32);
        let top = lerp(self.get(x, y), self.get(x + 1, y), f.x);
        let bottom = lerp(self.get(x, y + 1), self.get(x + 1, y + 1), f.x);
        lerp(top, bottom, f.y)
    }

    /// Texel center in texture coordinates.
    #[inline]
    fn uv(&self, x: u32, y: u32) -> Vec2 {
        Vec2::new(x as f32 + 0.5, y as f32 + 0.5) / self.size as f32
    }

    /// Copy values, as from an 8-bit upload (0 or 1 for a mask).
    pub fn fill_from(&mut self, values: impl IntoIterator<Item = f32>) {
        for (dst, v) in self.data.iter_mut().zip(values) {
            *dst = v;
        }
    }

    /// Grayscale bytes, for debugging dumps.
    pub fn to_gray_bytes(&self) -> Vec<u8> {
        self.data.iter().map(|&v| unorm8(v)).collect()
    }
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Float in `[0, 1]` to an 8-bit unorm value.
#[inline]
pub fn unorm8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Normalized Gaussian weights for taps `-radius..=radius`, `sigma = radius / 2`.
pub fn gaussian_weights(radius: u32) -> Vec<f32> {
    let sigma = (radius as f32 * 0.5).max(0.5);
    let r = radius as i32;
    let raw: Vec<f32> = (-r..=r)
        .map(|k| (-((k * k) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f32 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}

/// Sobel gradient magnitude of `src`, clamped to `[0, 1]`.
pub fn sobel(src: &Plane, dst: &mut Plane) {
    let size = dst.size();
    for y in 0..size {
        for x in 0..size {
            let (xi, yi) = (x as i32, y as i32);
            let tl = src.get(xi - 1, yi - 1);
            let t = src.get(xi, yi - 1);
            let tr = src.get(xi + 1, yi - 1);
            let l = src.get(xi - 1, yi);
            let r = src.get(xi + 1, yi);
            let bl = src.get(xi - 1, yi + 1);
            let b = src.get(xi, yi + 1);
            let br = src.get(xi + 1, yi + 1);
            let gx = (tr + 2.0 * r + br) - (tl + 2.0 * l + bl);
            let gy = (bl + 2.0 * b + br) - (tl + 2.0 * t + tr);
            dst.put(x, y, (gx * gx + gy * gy).sqrt().clamp(0.0, 1.0));
        }
    }
}

/// One direction of a separable Gaussian blur.
///
/// `dst` decides the resolution; taps are one `dst` texel apart and `src` is
/// sampled bilinearly, so the pass also resamples.
pub fn blur_pass(src: &Plane, dst: &mut Plane, radius: u32, direction: Vec2) {
    let weights = gaussian_weights(radius);
    let step = direction / dst.size() as f32;
    let r = radius as i32;
    for y in 0..dst.size() {
        for x in 0..dst.size() {
            let uv = dst.uv(x, y);
            let mut sum = 0.0;
            for (k, w) in (-r..=r).zip(&weights) {
                sum += w * src.sample(uv + step * k as f32);
            }
            dst.put(x, y, sum);
        }
    }
}

/// Horizontal then vertical blur of `src` into `dst` through `temp`.
pub fn blur_level(src: &Plane, temp: &mut Plane, dst: &mut Plane, radius: u32) {
    blur_pass(src, temp, radius, Vec2::X);
    blur_pass(temp, dst, radius, Vec2::Y);
}

/// Weighted sum of the cascade, clamped to `[0, 1]`.
pub fn blend(levels: &[Plane; CASCADE_LEVELS], dst: &mut Plane) {
    for y in 0..dst.size() {
        for x in 0..dst.size() {
            let uv = dst.uv(x, y);
            let closeness: f32 = levels
                .iter()
                .zip(BLEND_WEIGHTS)
                .map(|(level, w)| w * level.sample(uv))
                .sum();
            dst.put(x, y, closeness.clamp(0.0, 1.0));
        }
    }
}

/// Central-difference gradient of `src`, packed as RGBA8.
///
/// RG is the unit direction in texture space encoded as `d * 0.5 + 0.5`,
/// B is `1 - closeness`, A is 1.
pub fn normal_map(src: &Plane, dst: &mut FieldTexture) {
    let size = src.size();
    let texels = dst.texels_mut();
    for y in 0..size {
        for x in 0..size {
            let (xi, yi) = (x as i32, y as i32);
            let gradient = Vec2::new(
                src.get(xi + 1, yi) - src.get(xi - 1, yi),
                src.get(xi, yi + 1) - src.get(xi, yi - 1),
            );
            let len = gradient.length();
            let dir = if len > MIN_GRADIENT {
                gradient / len
            } else {
                Vec2::ZERO
            };
            let closeness = src.get(xi, yi);
            texels[(y * size + x) as usize] = [
                unorm8(dir.x * 0.5 + 0.5),
                unorm8(dir.y * 0.5 + 0.5),
                unorm8(1.0 - closeness),
                255,
            ];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_mask(size: u32, lo: u32, hi: u32) -> Plane {
        let mut plane = Plane::new(size);
        for y in lo..hi {
            for x in lo..hi {
                plane.put(x, y, 1.0);
            }
        }
        plane
    }

    #[test]
    fn test_gaussian_weights_normalized_and_symmetric() {
        for radius in [2, 4, 8, 16] {
            let w = gaussian_weights(radius);
            assert_eq!(w.len(), 2 * radius as usize + 1);
            let sum: f32 = w.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
            for k in 0..w.len() {
                assert!((w[k] - w[w.len() - 1 - k]).abs() < 1e-7);
            }
        }
    }

    #[test]
    fn test_sobel_marks_only_boundaries() {
        let mask = square_mask(32, 8, 24);
        let mut edge = Plane::new(32);
        sobel(&mask, &mut edge);
        assert_eq!(edge.get(16, 16), 0.0);
        assert_eq!(edge.get(0, 0), 0.0);
        assert_eq!(edge.get(8, 16), 1.0);
        assert_eq!(edge.get(7, 16), 1.0);
    }

    #[test]
    fn test_blur_preserves_constant() {
        let mut src = Plane::new(32);
        src.fill_from(std::iter::repeat(0.25));
        let mut temp = Plane::new(16);
        let mut dst = Plane::new(16);
        blur_level(&src, &mut temp, &mut dst, 4);
        for &v in dst.data() {
            assert!((v - 0.25).abs() < 1e-5);
        }
    }

    #[test]
    fn test_blur_spreads_edge_energy() {
        let mut src = Plane::new(32);
        src.put(16, 16, 1.0);
        let mut temp = Plane::new(32);
        let mut dst = Plane::new(32);
        blur_level(&src, &mut temp, &mut dst, 2);
        assert!(dst.get(16, 16) < 1.0);
        assert!(dst.get(17, 16) > 0.0);
        assert!(dst.get(16, 18) > 0.0);
        assert_eq!(dst.get(0, 0), 0.0);
    }

    #[test]
    fn test_normal_map_points_up_the_gradient() {
        // Closeness ramps up to the right.
        let mut plane = Plane::new(16);
        plane.fill_from((0..256).map(|i| (i % 16) as f32 / 16.0));
        let mut field = FieldTexture::neutral(16);
        normal_map(&plane, &mut field);
        let [r, g, b, a] = field.texels()[8 * 16 + 8];
        assert_eq!(r, 255);
        assert_eq!(g, 128);
        assert_eq!(b, unorm8(1.0 - 0.5));
        assert_eq!(a, 255);
    }

    #[test]
    fn test_flat_plane_has_no_direction() {
        let plane = Plane::new(16);
        let mut field = FieldTexture::neutral(16);
        normal_map(&plane, &mut field);
        assert!(field.texels().iter().all(|t| t[0] == 128 && t[1] == 128 && t[2] == 255));
    }
}
