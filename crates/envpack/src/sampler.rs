//! CPU texture sampling: cube directions, face texels and bilinear taps.
//!
//! Face selection follows the GL cube convention (major axis, then `sc`/`tc`
//! per face); row 0 of a face image is `t = 0`.

use glam::Vec3;

use crate::texture::{CubeFace, Cubemap, Image, LinearImage};

/// Direction through normalized face coordinates `(u, v)` in `[0, 1]`.
pub fn face_direction(face: CubeFace, u: f32, v: f32) -> Vec3 {
    let sc = 2.0 * u - 1.0;
    let tc = 2.0 * v - 1.0;

    let dir = match face {
        CubeFace::PositiveX => Vec3::new(1.0, -tc, -sc),
        CubeFace::NegativeX => Vec3::new(-1.0, -tc, sc),
        CubeFace::PositiveY => Vec3::new(sc, 1.0, tc),
        CubeFace::NegativeY => Vec3::new(sc, -1.0, -tc),
        CubeFace::PositiveZ => Vec3::new(sc, -tc, 1.0),
        CubeFace::NegativeZ => Vec3::new(-sc, -tc, -1.0),
    };

    dir.normalize()
}

/// Direction through the centre of texel `(x, y)` of a `size`×`size` face.
#[inline]
pub fn texel_direction(face: CubeFace, x: u32, y: u32, size: u32) -> Vec3 {
    let inv = 1.0 / size as f32;
    face_direction(face, (x as f32 + 0.5) * inv, (y as f32 + 0.5) * inv)
}

/// Face and normalized `(u, v)` hit by `dir`. Zero vectors map to +X centre.
pub fn direction_to_face(dir: Vec3) -> (CubeFace, f32, f32) {
    let a = dir.abs();

    let (face, sc, tc, ma) = if a.x >= a.y && a.x >= a.z {
        if dir.x >= 0.0 {
            (CubeFace::PositiveX, -dir.z, -dir.y, a.x)
        } else {
            (CubeFace::NegativeX, dir.z, -dir.y, a.x)
        }
    } else if a.y >= a.z {
        if dir.y >= 0.0 {
            (CubeFace::PositiveY, dir.x, dir.z, a.y)
        } else {
            (CubeFace::NegativeY, dir.x, -dir.z, a.y)
        }
    } else if dir.z >= 0.0 {
        (CubeFace::PositiveZ, dir.x, -dir.y, a.z)
    } else {
        (CubeFace::NegativeZ, -dir.x, -dir.y, a.z)
    };

    if ma <= 0.0 || !ma.is_finite() {
        return (CubeFace::PositiveX, 0.5, 0.5);
    }

    let u = 0.5 * (sc / ma + 1.0);
    let v = 0.5 * (tc / ma + 1.0);

    (face, u, v)
}

/// Pixel types that can be blended by a bilinear filter.
pub trait Filterable: Copy {
    fn lerp(a: Self, b: Self, t: f32) -> Self;
}

impl Filterable for [f32; 3] {
    #[inline]
    fn lerp(a: Self, b: Self, t: f32) -> Self {
        [
            a[0] + (b[0] - a[0]) * t,
            a[1] + (b[1] - a[1]) * t,
            a[2] + (b[2] - a[2]) * t,
        ]
    }
}

/// How out-of-range horizontal coordinates are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    ClampToEdge,
    Repeat,
}

/// Bilinear sample of `image` at normalized `(u, v)`; rows always clamp.
pub fn sample_bilinear<P: Filterable>(image: &Image<P>, u: f32, v: f32, address_u: AddressMode) -> P {
    let w = image.width as i64;
    let h = image.height as i64;

    let fx = u * image.width as f32 - 0.5;
    let fy = v * image.height as f32 - 0.5;

    let x0 = fx.floor();
    let y0 = fy.floor();
    let tx = fx - x0;
    let ty = fy - y0;

    let resolve_x = |x: i64| -> u32 {
        match address_u {
            AddressMode::ClampToEdge => x.clamp(0, w - 1) as u32,
            AddressMode::Repeat => x.rem_euclid(w) as u32,
        }
    };
    let resolve_y = |y: i64| -> u32 { y.clamp(0, h - 1) as u32 };

    let (x0, y0) = (x0 as i64, y0 as i64);
    let xa = resolve_x(x0);
    let xb = resolve_x(x0 + 1);
    let ya = resolve_y(y0);
    let yb = resolve_y(y0 + 1);

    let top = P::lerp(image.pixel(xa, ya), image.pixel(xb, ya), tx);
    let bottom = P::lerp(image.pixel(xa, yb), image.pixel(xb, yb), tx);

    P::lerp(top, bottom, ty)
}

/// Bilinear sample of one mip level of a cube along `dir`. Taps do not cross
/// face seams; they clamp at the face edge.
pub fn sample_cube<P: Filterable>(cube: &Cubemap<P>, level: usize, dir: Vec3) -> P {
    let level = level.min(cube.mip_count() - 1);
    let (face, u, v) = direction_to_face(dir);

    sample_bilinear(cube.face(level, face), u, v, AddressMode::ClampToEdge)
}

/// Nearest-texel lookup along `dir`.
pub fn sample_cube_nearest<P: Copy>(cube: &Cubemap<P>, level: usize, dir: Vec3) -> P {
    let level = level.min(cube.mip_count() - 1);
    let (face, u, v) = direction_to_face(dir);
    let image = cube.face(level, face);

    let x = ((u * image.width as f32) as u32).min(image.width - 1);
    let y = ((v * image.height as f32) as u32).min(image.height - 1);

    image.pixel(x, y)
}

/// Bilinear sample of a panorama; longitude wraps, latitude clamps.
#[inline]
pub fn sample_panorama(image: &LinearImage, u: f32, v: f32) -> [f32; 3] {
    sample_bilinear(image, u, v, AddressMode::Repeat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_centres_point_along_axes() {
        let cases = [
            (CubeFace::PositiveX, Vec3::X),
            (CubeFace::NegativeX, Vec3::NEG_X),
            (CubeFace::PositiveY, Vec3::Y),
            (CubeFace::NegativeY, Vec3::NEG_Y),
            (CubeFace::PositiveZ, Vec3::Z),
            (CubeFace::NegativeZ, Vec3::NEG_Z),
        ];

        for (face, axis) in cases {
            let dir = face_direction(face, 0.5, 0.5);
            assert!((dir - axis).length() < 1e-6, "{} -> {:?}", face, dir);
        }
    }

    #[test]
    fn texel_directions_map_back_to_their_texel() {
        let size = 8;

        for face in CubeFace::ALL {
            for y in 0..size {
                for x in 0..size {
                    let dir = texel_direction(face, x, y, size);
                    let (hit, u, v) = direction_to_face(dir);

                    assert_eq!(hit, face);
                    assert_eq!((u * size as f32) as u32, x);
                    assert_eq!((v * size as f32) as u32, y);
                }
            }
        }
    }

    #[test]
    fn bilinear_at_texel_centre_is_exact() {
        let image = Image::from_fn(4, 4, |x, y| [x as f32, y as f32, 0.0]);
        let p = sample_bilinear(&image, 2.5 / 4.0, 1.5 / 4.0, AddressMode::ClampToEdge);

        assert!((p[0] - 2.0).abs() < 1e-6);
        assert!((p[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn panorama_wraps_horizontally() {
        let image = Image::from_fn(4, 2, |x, _| if x == 0 || x == 3 { [1.0; 3] } else { [0.0; 3] });
        let p = sample_panorama(&image, 0.0, 0.5);

        assert!((p[0] - 1.0).abs() < 1e-6);
    }
}
