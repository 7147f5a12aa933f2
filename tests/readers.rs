use std::path::Path;

use dicom_core::{DataElement, PrimitiveValue, VR};
use dicom_dictionary_std::{tags, uids};
use dicom_object::{FileMetaTableBuilder, InMemDicomObject};
use image::{GrayImage, Luma, Rgb, RgbImage};
use tempfile::tempdir;

use framepipe::readers::{
    band_path, read_annotated, read_dense_optical_flow, read_hyper_spectral, read_image,
    read_medical, read_multi_spectral, read_point_cloud, read_time_series, ImageKind,
};
use framepipe::transform::draw::Annotation;
use framepipe::transform::FlowParams;
use framepipe::{DecodeError, PixelEncoding};

fn write_square(path: &Path, size: u32, offset: u32) -> anyhow::Result<()> {
    let image = GrayImage::from_fn(size, size, |x, y| {
        let inside = (offset..offset + 8).contains(&x) && (12..20).contains(&y);
        Luma([if inside { 220 } else { 30 }])
    });
    image.save(path)?;
    Ok(())
}

const INSTANCE_UID: &str = "2.25.137038125948464847900039011591283709926";

/// Uncompressed 16-bit MONOCHROME2 file with `frames` slices of `rows x cols`.
fn write_dicom(path: &Path, rows: u16, cols: u16, frames: u16, values: &[u16]) -> anyhow::Result<()> {
    let us = |tag, v: u16| DataElement::new(tag, VR::US, PrimitiveValue::from(v));
    let mut obj = InMemDicomObject::new_empty();
    obj.put(DataElement::new(
        tags::SOP_CLASS_UID,
        VR::UI,
        PrimitiveValue::from(uids::SECONDARY_CAPTURE_IMAGE_STORAGE),
    ));
    obj.put(DataElement::new(
        tags::SOP_INSTANCE_UID,
        VR::UI,
        PrimitiveValue::from(INSTANCE_UID),
    ));
    obj.put(DataElement::new(
        tags::PHOTOMETRIC_INTERPRETATION,
        VR::CS,
        PrimitiveValue::from("MONOCHROME2"),
    ));
    obj.put(DataElement::new(
        tags::NUMBER_OF_FRAMES,
        VR::IS,
        PrimitiveValue::from(frames.to_string()),
    ));
    obj.put(us(tags::SAMPLES_PER_PIXEL, 1));
    obj.put(us(tags::ROWS, rows));
    obj.put(us(tags::COLUMNS, cols));
    obj.put(us(tags::BITS_ALLOCATED, 16));
    obj.put(us(tags::BITS_STORED, 16));
    obj.put(us(tags::HIGH_BIT, 15));
    obj.put(us(tags::PIXEL_REPRESENTATION, 0));
    obj.put(DataElement::new(
        tags::PIXEL_DATA,
        VR::OW,
        PrimitiveValue::U16(values.iter().copied().collect()),
    ));

    let file = obj.with_meta(
        FileMetaTableBuilder::new()
            .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
            .media_storage_sop_class_uid(uids::SECONDARY_CAPTURE_IMAGE_STORAGE)
            .media_storage_sop_instance_uid(INSTANCE_UID),
    )?;
    file.write_to_file(path)?;
    Ok(())
}

#[test]
fn missing_inputs_are_not_found() {
    let missing = Path::new("/nonexistent/framepipe/input.png");
    for kind in ImageKind::ALL {
        assert!(matches!(
            read_image(kind, missing),
            Err(DecodeError::NotFound { .. })
        ));
    }
    assert!(matches!(
        read_hyper_spectral("/nonexistent/cube.npy"),
        Err(DecodeError::NotFound { .. })
    ));
    assert!(matches!(
        read_point_cloud("/nonexistent/cloud.ply"),
        Err(DecodeError::NotFound { .. })
    ));
    assert!(matches!(
        read_time_series("/nonexistent/clip.mp4"),
        Err(DecodeError::NotFound { .. })
    ));
    assert!(matches!(
        read_medical("/nonexistent/scan.dcm"),
        Err(DecodeError::NotFound { .. })
    ));
}

#[test]
fn medical_volume_reads_every_slice() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("scan.dcm");
    write_dicom(&path, 2, 3, 2, &[0, 10, 20, 30, 40, 50, 1000, 1000, 1000, 1000, 1000, 4000])?;

    let volume = read_medical(&path)?;
    assert_eq!((volume.width, volume.height, volume.frames), (3, 2, 2));
    assert_eq!(volume.samples_per_pixel, 1);
    assert_eq!(volume.slice(0), Some(&[0, 10, 20, 30, 40, 50][..]));
    assert_eq!(volume.slice(1).map(|s| s[5]), Some(4000));

    let frame = volume
        .slice_frame(1)
        .ok_or_else(|| anyhow::anyhow!("missing slice"))??;
    assert_eq!(frame.encoding(), PixelEncoding::Gray);
    assert_eq!(frame.dimensions(), (3, 2));
    assert_eq!(frame.pixel(2, 1), &[255]);
    assert_eq!(frame.pixel(0, 0), &[0]);
    Ok(())
}

#[test]
fn corrupt_medical_file_is_invalid() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("scan.dcm");
    std::fs::write(&path, [0u8; 200])?;
    assert!(matches!(read_medical(&path), Err(DecodeError::Invalid { .. })));
    Ok(())
}

#[test]
fn color_and_gray_kinds_pick_encodings() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("photo.png");
    RgbImage::from_pixel(6, 4, Rgb([200, 100, 10])).save(&path)?;

    let color = read_image(ImageKind::Color, &path)?;
    assert_eq!(color.encoding(), PixelEncoding::Bgr);
    assert_eq!(color.pixel(0, 0), &[10, 100, 200]);

    let thermal = read_image(ImageKind::Thermal, &path)?;
    assert_eq!(thermal.encoding(), PixelEncoding::Gray);
    assert_eq!(thermal.dimensions(), (6, 4));
    Ok(())
}

#[test]
fn multi_spectral_reads_every_band() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let base = dir.path().join("scene");
    for band in 0..3u8 {
        GrayImage::from_pixel(5, 5, Luma([band * 40])).save(band_path(&base, band as usize))?;
    }

    let bands = read_multi_spectral(&base, 3)?;
    assert_eq!(bands.len(), 3);
    assert_eq!(bands[2].pixel(4, 4), &[80]);
    assert_eq!(bands[2].sequence(), 2);

    assert!(matches!(
        read_multi_spectral(&base, 4),
        Err(DecodeError::NotFound { .. })
    ));
    Ok(())
}

#[test]
fn hyper_spectral_reads_hand_written_npy() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("cube.npy");

    let mut header = "{'descr': '<f4', 'fortran_order': False, 'shape': (2, 2), }".to_string();
    while (10 + header.len() + 1) % 64 != 0 {
        header.push(' ');
    }
    header.push('\n');
    let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
    bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    for v in [0.5f32, 1.5, 2.5, 3.5] {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    std::fs::write(&path, bytes)?;

    let cube = read_hyper_spectral(&path)?;
    assert_eq!(cube.shape, vec![2, 2]);
    assert_eq!(cube.get(&[1, 0]), Some(2.5));
    Ok(())
}

#[test]
fn oversized_header_counts_are_invalid() -> anyhow::Result<()> {
    let dir = tempdir()?;

    let ply = dir.path().join("cloud.ply");
    std::fs::write(
        &ply,
        "ply\nformat ascii 1.0\nelement vertex 1152921504606846976\nproperty float x\n\
         property float y\nproperty float z\nend_header\n0 0 0\n",
    )?;
    assert!(matches!(read_point_cloud(&ply), Err(DecodeError::Invalid { .. })));

    let npy = dir.path().join("cube.npy");
    let mut header =
        "{'descr': '<f4', 'fortran_order': False, 'shape': (4611686018427387904, 4), }".to_string();
    while (10 + header.len() + 1) % 64 != 0 {
        header.push(' ');
    }
    header.push('\n');
    let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
    bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    std::fs::write(&npy, bytes)?;
    assert!(matches!(read_hyper_spectral(&npy), Err(DecodeError::Invalid { .. })));
    Ok(())
}

#[test]
fn point_cloud_reads_ascii_ply() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("cloud.ply");
    std::fs::write(
        &path,
        "ply\nformat ascii 1.0\nelement vertex 2\nproperty float x\nproperty float y\n\
         property float z\nend_header\n0 0 0\n1 2 3\n",
    )?;

    let cloud = read_point_cloud(&path)?;
    assert_eq!(cloud.points, vec![[0.0, 0.0, 0.0], [1.0, 2.0, 3.0]]);
    assert!(cloud.colors.is_none());
    Ok(())
}

#[test]
fn annotations_are_outlined_in_blue() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("street.png");
    RgbImage::from_pixel(40, 40, Rgb([0, 0, 0])).save(&path)?;

    let annotations: Vec<Annotation> =
        serde_json::from_str(r#"[{"start_point": [5, 5], "end_point": [30, 20]}]"#)?;
    let frame = read_annotated(&path, &annotations)?;

    assert_eq!(frame.encoding(), PixelEncoding::Bgr);
    assert_eq!(frame.pixel(5, 5), &[255, 0, 0]);
    assert_eq!(frame.pixel(17, 12), &[0, 0, 0]);
    Ok(())
}

#[test]
fn time_series_reads_an_image_directory() -> anyhow::Result<()> {
    let dir = tempdir()?;
    for (i, offset) in [4u32, 6, 8].iter().enumerate() {
        write_square(&dir.path().join(format!("frame_{:03}.png", i)), 32, *offset)?;
    }

    let uri = dir.path().to_string_lossy().to_string();
    let series = read_time_series(&uri)?;
    assert_eq!(series.len(), 3);
    assert!(!series.truncated);
    assert!(series.frames.iter().all(|f| f.dimensions() == (32, 32)));
    Ok(())
}

#[test]
fn corrupt_frame_marks_series_truncated() -> anyhow::Result<()> {
    let dir = tempdir()?;
    write_square(&dir.path().join("frame_000.png"), 32, 4)?;
    std::fs::write(dir.path().join("frame_001.png"), b"not a png")?;
    write_square(&dir.path().join("frame_002.png"), 32, 8)?;

    let uri = dir.path().to_string_lossy().to_string();
    let series = read_time_series(&uri)?;
    assert_eq!(series.len(), 1);
    assert!(series.truncated);
    Ok(())
}

#[test]
fn dense_flow_yields_one_field_per_pair() -> anyhow::Result<()> {
    let dir = tempdir()?;
    for (i, offset) in [8u32, 10, 12].iter().enumerate() {
        write_square(&dir.path().join(format!("frame_{:03}.png", i)), 32, *offset)?;
    }

    let uri = dir.path().to_string_lossy().to_string();
    let fields = read_dense_optical_flow(&uri, FlowParams::default())?;
    assert_eq!(fields.len(), 2);
    assert_eq!(fields[0].dimensions(), (32, 32));
    assert!(fields[0].mean_magnitude() > 0.0);
    Ok(())
}

#[test]
fn synthetic_series_is_bounded() -> anyhow::Result<()> {
    let series = read_time_series("stub://series")?;
    assert!(!series.is_empty());
    assert!(!series.truncated);
    assert!(series.frames.windows(2).all(|w| w[0].sequence() < w[1].sequence()));
    Ok(())
}
