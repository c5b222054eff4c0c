use ndarray::prelude::*;
use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
};

use crate::bbox::{BBox, Ltrb};
use crate::error::Error;

/// Decoded RGB frame, indexed as `[row, column, channel]`.
pub type Image = Array3<u8>;

/// (width, height) of an image
#[inline]
pub fn dims(image: &Image) -> (usize, usize) {
    let shape = image.shape();
    (shape[1], shape[0])
}

/// Copies an RGB frame into a `CV_8UC3` matrix.
pub fn to_mat(image: &Image) -> Result<Mat, Error> {
    let (w, h) = dims(image);
    let mut mat = Mat::new_rows_cols_with_default(
        h as i32,
        (w * 3) as i32,
        core::CV_8UC1,
        core::Scalar::all(0.0),
    )?;

    for (dst, src) in mat.data_typed_mut::<u8>()?.iter_mut().zip(image.iter()) {
        *dst = *src;
    }

    Ok(mat.reshape(3, h as i32)?)
}

/// Luma plane of an RGB frame as a `CV_8UC1` matrix.
pub fn to_gray_mat(image: &Image) -> Result<Mat, Error> {
    let rgb = to_mat(image)?;
    let mut gray = Mat::default();
    imgproc::cvt_color(&rgb, &mut gray, imgproc::COLOR_RGB2GRAY, 0)?;

    Ok(gray)
}

/// 8-bit mask with 255 where `mask` is set, as opencv feature detection expects.
pub fn mask_to_mat(mask: &Array2<bool>) -> Result<Mat, Error> {
    let (h, w) = mask.dim();
    let mut mat = Mat::new_rows_cols_with_default(
        h as i32,
        w as i32,
        core::CV_8UC1,
        core::Scalar::all(0.0),
    )?;

    for (dst, &set) in mat.data_typed_mut::<u8>()?.iter_mut().zip(mask.iter()) {
        *dst = if set { 255 } else { 0 };
    }

    Ok(mat)
}

/// Pixels inside `bbox`, clamped to the image. Coordinates are truncated to
/// whole pixels; the result may be empty for boxes outside the frame.
pub fn crop<'a>(image: &'a Image, bbox: &BBox<Ltrb>) -> ArrayView3<'a, u8> {
    let (w, h) = dims(image);
    let clamp = |v: f32, max: usize| (v.max(0.0) as usize).min(max);

    let x1 = clamp(bbox.left(), w);
    let x2 = clamp(bbox.right(), w).max(x1);
    let y1 = clamp(bbox.top(), h);
    let y2 = clamp(bbox.bottom(), h).max(y1);

    image.slice(s![y1..y2, x1..x2, ..])
}

/// Upper half of a cropped player, which is mostly jersey.
#[inline]
pub fn top_half<'a>(crop: ArrayView3<'a, u8>) -> ArrayView3<'a, u8> {
    let half = crop.shape()[0] / 2;
    crop.slice_move(s![..half, .., ..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_is_clamped() {
        let img = Image::zeros((10, 20, 3));

        let c = crop(&img, &BBox::ltrb(15.0, 5.0, 40.0, 30.0));
        assert_eq!(c.shape(), &[5, 5, 3]);

        let c = crop(&img, &BBox::ltrb(25.0, 12.0, 40.0, 30.0));
        assert_eq!(c.shape(), &[0, 0, 3]);
    }

    #[test]
    fn top_half_of_crop() {
        let mut img = Image::zeros((8, 8, 3));
        img.slice_mut(s![..4, .., ..]).fill(200);

        let half = top_half(crop(&img, &BBox::ltrb(0.0, 0.0, 8.0, 8.0)));
        assert_eq!(half.shape(), &[4, 8, 3]);
        assert!(half.iter().all(|&v| v == 200));
    }

    #[test]
    fn gray_of_white_is_bright() {
        let img = Image::from_elem((2, 3, 3), 255);
        let gray = to_gray_mat(&img).unwrap();

        assert_eq!((gray.rows(), gray.cols()), (2, 3));
        assert!(gray.data_typed::<u8>().unwrap().iter().all(|&v| v == 255));
    }

    #[test]
    fn mat_keeps_pixel_layout() {
        let mut img = Image::zeros((2, 3, 3));
        img[[1, 2, 0]] = 200;
        img[[0, 1, 2]] = 50;

        let mat = to_mat(&img).unwrap();
        assert_eq!((mat.rows(), mat.cols()), (2, 3));

        // same bytes as the ndarray, one channel per column
        let flat = mat.reshape(1, 0).unwrap();
        assert_eq!(flat.cols(), 9);
        assert_eq!(flat.data_typed::<u8>().unwrap(), img.as_slice().unwrap());
    }

    #[test]
    fn mask_is_255_where_set() {
        let mut mask = Array2::from_elem((2, 4), false);
        mask[[1, 3]] = true;

        let mat = mask_to_mat(&mask).unwrap();
        assert_eq!(mat.data_typed::<u8>().unwrap(), &[0, 0, 0, 0, 0, 0, 0, 255]);
    }
}
