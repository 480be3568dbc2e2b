use image::{imageops, DynamicImage, RgbaImage};
use image_hasher::{HashAlg, HasherConfig, ImageHash};

// Hashing a thumbnail gives the same 8x8 gradient hash at a fraction of the cost.
const THUMBNAIL_EDGE: u32 = 256;

pub fn compute_phash(image: &RgbaImage) -> String {
    let thumbnail = imageops::thumbnail(image, THUMBNAIL_EDGE, THUMBNAIL_EDGE);
    let img = DynamicImage::ImageRgba8(thumbnail);
    let hasher = HasherConfig::new()
        .hash_alg(HashAlg::DoubleGradient)
        .hash_size(8, 8)
        .to_hasher();

    let hash = hasher.hash_image(&img);
    hash.to_base64()
}

pub fn compute_hamming_distance(lhs: &str, rhs: &str) -> u32 {
    let Ok(h1) = ImageHash::<Vec<u8>>::from_base64(lhs) else {
        return u32::MAX;
    };
    let Ok(h2) = ImageHash::<Vec<u8>>::from_base64(rhs) else {
        return u32::MAX;
    };
    h1.dist(&h2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn split_frame(dark_left: bool) -> RgbaImage {
        RgbaImage::from_fn(128, 96, |x, _| {
            let dark = (x < 64) == dark_left;
            if dark {
                Rgba([10, 10, 10, 255])
            } else {
                Rgba([240, 240, 240, 255])
            }
        })
    }

    #[test]
    fn identical_frames_have_zero_distance() {
        let a = compute_phash(&split_frame(true));
        let b = compute_phash(&split_frame(true));
        assert_eq!(compute_hamming_distance(&a, &b), 0);
    }

    #[test]
    fn different_layouts_are_far_apart() {
        let a = compute_phash(&split_frame(true));
        let b = compute_phash(&split_frame(false));
        assert!(compute_hamming_distance(&a, &b) > 0);
    }

    #[test]
    fn garbage_hash_is_maximally_distant() {
        let a = compute_phash(&split_frame(true));
        assert_eq!(compute_hamming_distance(&a, "not base64!"), u32::MAX);
    }
}
