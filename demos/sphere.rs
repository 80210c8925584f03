use image::{Rgb, RgbImage};
use log::info;
use ndarray::{Array3, ArrayView2, Zip};
use num_complex::Complex;
use palette::{Lch, Srgb};
use ssnp::{Angle, CpuBackend, ForwardModel, IndexMode, IndexVolume, ModelConfig, OutputMode};

pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let size = 128;
    let depth = 64;
    let radius = 24.0;
    let contrast = 0.01;

    let volume = IndexVolume::from_array(&generate_sphere(size, depth, radius, contrast));
    let angles = [Angle::new(0.0, 0.0), Angle::new(-0.49, 0.33)];

    let backend = CpuBackend::new();
    let config = ModelConfig {
        index: IndexMode::Contrast,
        ..ModelConfig::default()
    };
    let intensity = ForwardModel::new(&backend, config.clone())?.forward(&volume, &angles)?;
    for (i, image) in intensity.iter().enumerate() {
        if let Some(values) = image.as_real() {
            save_real_image(format!("sphere_intensity_{}.png", i), values.view(), 1.0, true)?;
        }
    }

    let complex = ForwardModel::new(
        &backend,
        ModelConfig {
            output: OutputMode::Complex,
            ..config
        },
    )?
    .forward(&volume, &angles[1..])?;
    if let Some(field) = complex[0].to_complex_field() {
        save_complex_image("sphere_field.png", field.view())?;
    }
    Ok(())
}

/// Index contrast of a centred sphere, `radius` in samples.
pub fn generate_sphere(size: usize, depth: usize, radius: f32, contrast: f32) -> Array3<f32> {
    let c = (size / 2) as f32;
    let cz = (depth / 2) as f32;
    let mut volume = Array3::zeros([depth, size, size]);
    Zip::indexed(&mut volume).par_for_each(|(z, y, x), e| {
        let (z0, y0, x0) = (z as f32 - cz, y as f32 - c, x as f32 - c);
        if z0 * z0 + y0 * y0 + x0 * x0 <= radius * radius {
            *e = contrast;
        }
    });
    volume
}

pub fn save_real_image<T: AsRef<std::path::Path> + std::fmt::Debug>(
    file_name: T,
    arr: ArrayView2<f32>,
    amp: f64,
    normalise: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (h, w) = arr.dim();
    let mut max = arr.iter().fold(0.0f64, |max, &val| (val as f64).max(max));
    let sum = arr.iter().fold(0.0f64, |sum, &val| val as f64 + sum);
    info!("h:{} w:{} max:{} sum:{} - {:?}", h, w, max, sum, file_name);

    let mut img = RgbImage::new(w as u32, h as u32);
    if !normalise || max == 0.0 {
        max = 1.0;
    }

    for (x, y, p) in img.enumerate_pixels_mut() {
        let value = arr[[y as usize, x as usize]] as f64 / max;
        let value = (value * amp).min(1.0);

        let colour = Srgb::from(Lch::new(value * 70.0, value * 128.0, 280.0 - 245.0 * value));
        *p = Rgb([
            (colour.red * 255.0) as u8,
            (colour.green * 255.0) as u8,
            (colour.blue * 255.0) as u8,
        ]);
    }

    img.save(file_name)?;
    Ok(())
}

pub fn save_complex_image<T: AsRef<std::path::Path> + std::fmt::Debug>(
    file_name: T,
    arr: ArrayView2<Complex<f32>>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (h, w) = arr.dim();
    let max_sqr = arr.iter().fold(0.0f64, |max, val| (val.norm_sqr() as f64).max(max));
    info!("h:{} w:{} max_sqr:{} - {:?}", h, w, max_sqr, file_name);

    let max = if max_sqr > 0.0 { max_sqr.sqrt() } else { 1.0 };

    let mut img = RgbImage::new(w as u32, h as u32);

    for (x, y, p) in img.enumerate_pixels_mut() {
        let (r, theta) = arr[[y as usize, x as usize]].to_polar();
        let r = r as f64 / max;

        let colour = Srgb::from(Lch::new(
            r * 100.0,
            r * 128.0,
            360.0 * (theta as f64 / std::f64::consts::PI + 1.0) * 0.5,
        ));
        *p = Rgb([
            (colour.red * 255.0) as u8,
            (colour.green * 255.0) as u8,
            (colour.blue * 255.0) as u8,
        ]);
    }

    img.save(file_name)?;
    Ok(())
}
