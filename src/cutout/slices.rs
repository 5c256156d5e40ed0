//! Slice directories: one 2-D image per z index.
//!
//! Slices are named `NNN.<ext>` starting at 1. Image width is the x extent
//! of the volume and height the y extent. Grayscale volumes are stored as
//! 8-bit luma. Label volumes are stored as 24-bit RGB with the label split
//! as `R << 16 | G << 8 | B`, which the desktop review editor reads back as
//! segment ids.

use std::path::{Path, PathBuf};

use image::{DynamicImage, GenericImageView, GrayImage, Luma, Rgb, RgbImage};
use log::debug;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3, Axis};
use walkdir::WalkDir;

use crate::error::GtbotError;
use crate::volume::{LayerKind, Voxel};

/// Largest label representable in an RGB slice.
pub const MAX_RGB_LABEL: u64 = (1 << 24) - 1;

/// A voxel type with a 2-D image encoding.
pub trait SliceVoxel: Voxel {
    /// Layer type a volume of this voxel is uploaded as.
    const KIND: LayerKind;

    /// Encodes a slice indexed `[x, y]`. `path` is only used in errors.
    fn encode_slice(slice: ArrayView2<'_, Self>, path: &Path) -> Result<DynamicImage, GtbotError>;

    /// Decodes an image into a slice indexed `[x, y]`.
    fn decode_slice(image: &DynamicImage) -> Array2<Self>;
}

impl SliceVoxel for u8 {
    const KIND: LayerKind = LayerKind::Image;

    fn encode_slice(slice: ArrayView2<'_, Self>, _path: &Path) -> Result<DynamicImage, GtbotError> {
        let (w, h) = slice.dim();
        let img = GrayImage::from_fn(w as u32, h as u32, |x, y| {
            Luma([slice[[x as usize, y as usize]]])
        });
        Ok(DynamicImage::ImageLuma8(img))
    }

    fn decode_slice(image: &DynamicImage) -> Array2<Self> {
        let gray = image.to_luma8();
        let (w, h) = gray.dimensions();
        Array2::from_shape_fn((w as usize, h as usize), |(x, y)| {
            gray.get_pixel(x as u32, y as u32)[0]
        })
    }
}

impl SliceVoxel for u32 {
    const KIND: LayerKind = LayerKind::Segmentation;

    fn encode_slice(slice: ArrayView2<'_, Self>, path: &Path) -> Result<DynamicImage, GtbotError> {
        if let Some(&label) = slice.iter().find(|&&v| v as u64 > MAX_RGB_LABEL) {
            return Err(GtbotError::LabelOutOfRange {
                path: path.to_path_buf(),
                label: label as u64,
            });
        }
        let (w, h) = slice.dim();
        let img = RgbImage::from_fn(w as u32, h as u32, |x, y| {
            let v = slice[[x as usize, y as usize]];
            Rgb([(v >> 16) as u8, (v >> 8) as u8, v as u8])
        });
        Ok(DynamicImage::ImageRgb8(img))
    }

    fn decode_slice(image: &DynamicImage) -> Array2<Self> {
        let (w, h) = image.dimensions();
        let shape = (w as usize, h as usize);
        match image {
            DynamicImage::ImageLuma8(gray) => {
                Array2::from_shape_fn(shape, |(x, y)| gray.get_pixel(x as u32, y as u32)[0] as u32)
            }
            DynamicImage::ImageLuma16(gray) => {
                Array2::from_shape_fn(shape, |(x, y)| gray.get_pixel(x as u32, y as u32)[0] as u32)
            }
            other => {
                let rgb = other.to_rgb8();
                Array2::from_shape_fn(shape, |(x, y)| {
                    let [r, g, b] = rgb.get_pixel(x as u32, y as u32).0;
                    (r as u32) << 16 | (g as u32) << 8 | b as u32
                })
            }
        }
    }
}

/// Writes `volume` as one image per z index into `dir`.
///
/// File names are zero padded to `max(3, digits(depth))` so lexicographic
/// and numeric order agree. The directory is created if absent. Returns
/// the written paths in z order.
pub fn to_slice_directory<T: SliceVoxel>(
    volume: ArrayView3<'_, T>,
    dir: &Path,
    extension: &str,
) -> Result<Vec<PathBuf>, GtbotError> {
    std::fs::create_dir_all(dir)?;

    let depth = volume.len_of(Axis(2));
    let width = depth.to_string().len().max(3);
    let mut written = Vec::with_capacity(depth);

    for (z, slice) in volume.axis_iter(Axis(2)).enumerate() {
        let path = dir.join(format!("{:0width$}.{}", z + 1, extension, width = width));
        let image = T::encode_slice(slice, &path)?;
        image
            .save(&path)
            .map_err(|source| GtbotError::ImageWrite {
                path: path.clone(),
                source,
            })?;
        debug!("wrote {}", path.display());
        written.push(path);
    }

    Ok(written)
}

/// Loads a slice directory written by [`to_slice_directory`] or edited by
/// hand.
///
/// Files are matched on `extension` case-insensitively and stacked along z
/// in file-name order.
///
/// # Errors
/// - [`GtbotError::NoSlices`] when no file matches.
/// - [`GtbotError::InconsistentSliceShape`] when slices differ in size.
pub fn from_slice_directory<T: SliceVoxel>(
    dir: &Path,
    extension: &str,
) -> Result<Array3<T>, GtbotError> {
    let files = collect_slices(dir, extension)?;
    let Some(first) = files.first() else {
        return Err(GtbotError::NoSlices {
            path: dir.to_path_buf(),
            extension: extension.to_string(),
        });
    };

    let (width, height) = open_image(first)?.dimensions();
    let mut volume = Array3::from_elem((width as usize, height as usize, files.len()), T::default());

    for (z, path) in files.iter().enumerate() {
        let image = open_image(path)?;
        let (w, h) = image.dimensions();
        if (w, h) != (width, height) {
            return Err(GtbotError::InconsistentSliceShape {
                path: path.clone(),
                expected_width: width,
                expected_height: height,
                width: w,
                height: h,
            });
        }
        volume
            .index_axis_mut(Axis(2), z)
            .assign(&T::decode_slice(&image));
    }

    debug!(
        "loaded {} slices of {}x{} from {}",
        files.len(),
        width,
        height,
        dir.display()
    );
    Ok(volume)
}

/// First extension in `candidates` that has at least one slice in `dir`.
pub fn find_slice_extension<'a>(
    dir: &Path,
    candidates: &[&'a str],
) -> Result<Option<&'a str>, GtbotError> {
    for extension in candidates {
        if !collect_slices(dir, extension)?.is_empty() {
            return Ok(Some(extension));
        }
    }
    Ok(None)
}

/// Guesses the layer kind of a slice directory from its first slice:
/// 8-bit grayscale is an image, anything else a segmentation.
pub fn probe_layer_kind(dir: &Path, extension: &str) -> Result<LayerKind, GtbotError> {
    let files = collect_slices(dir, extension)?;
    let Some(first) = files.first() else {
        return Err(GtbotError::NoSlices {
            path: dir.to_path_buf(),
            extension: extension.to_string(),
        });
    };
    Ok(match open_image(first)? {
        DynamicImage::ImageLuma8(_) => LayerKind::Image,
        _ => LayerKind::Segmentation,
    })
}

fn collect_slices(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, GtbotError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() && has_extension(entry.path(), extension) {
            files.push(entry.path().to_path_buf());
        }
    }
    Ok(files)
}

fn has_extension(path: &Path, wanted: &str) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };
    ext.eq_ignore_ascii_case(wanted)
}

fn open_image(path: &Path) -> Result<DynamicImage, GtbotError> {
    image::open(path).map_err(|source| GtbotError::ImageRead {
        path: path.to_path_buf(),
        source,
    })
}
