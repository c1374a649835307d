//! Reads the pixel dimensions of a JPEG 2000 image from its header
use crate::error::RasterError;
use crate::s3::S3ObjOps;
use anyhow::Result;

/// Bytes fetched from the start of an image; the header boxes sit well inside this window.
pub const HEADER_WINDOW: u64 = 4096;

const JP2_SIGNATURE: [u8; 12] = [
    0x00, 0x00, 0x00, 0x0C, b'j', b'P', b' ', b' ', 0x0D, 0x0A, 0x87, 0x0A,
];
const SOC_MARKER: [u8; 2] = [0xFF, 0x4F];
const SIZ_MARKER: [u8; 2] = [0xFF, 0x51];

/// `(rows, columns)` of the image
pub fn read_shape(header: &[u8]) -> Result<(u32, u32), RasterError> {
    if header.starts_with(&JP2_SIGNATURE) {
        let jp2h = find_box(header, b"jp2h")?;
        let ihdr = find_box(jp2h, b"ihdr")?;
        if ihdr.len() < 8 {
            return Err(RasterError::Truncated);
        }
        Ok((read_u32(&ihdr[0..4]), read_u32(&ihdr[4..8])))
    } else if header.starts_with(&SOC_MARKER) {
        codestream_shape(header)
    } else {
        Err(RasterError::UnknownFormat)
    }
}

/// Fetches the head of an image object and reads its shape.
pub async fn fetch_shape(store: &impl S3ObjOps, bucket: &str, key: &str) -> Result<(u32, u32)> {
    let header = store
        .get_object_range(bucket, key, 0, HEADER_WINDOW - 1)
        .await?;
    let shape = read_shape(&header)?;
    Ok(shape)
}

/// Contents of the first box of the given type among the boxes in `data`.
fn find_box<'a>(mut data: &'a [u8], box_type: &[u8; 4]) -> Result<&'a [u8], RasterError> {
    while data.len() >= 8 {
        let length = read_u32(&data[0..4]) as usize;
        let kind = &data[4..8];

        let (header_length, box_length) = match length {
            // The box extends to the end of the data
            0 => (8, data.len()),
            // 64-bit extended length
            1 => {
                if data.len() < 16 {
                    return Err(RasterError::Truncated);
                }
                (16, read_u64(&data[8..16]) as usize)
            }
            _ => (8, length),
        };

        if box_length < header_length {
            return Err(RasterError::UnknownFormat);
        }

        if kind == box_type {
            let end = box_length.min(data.len());
            return Ok(&data[header_length..end]);
        }

        if box_length > data.len() {
            return Err(RasterError::Truncated);
        }
        data = &data[box_length..];
    }

    if data.is_empty() {
        Err(RasterError::MissingHeader)
    } else {
        Err(RasterError::Truncated)
    }
}

fn codestream_shape(data: &[u8]) -> Result<(u32, u32), RasterError> {
    // SOC, then SIZ: marker(2) Lsiz(2) Rsiz(2) Xsiz(4) Ysiz(4) XOsiz(4) YOsiz(4)
    if data.len() < 24 {
        return Err(RasterError::Truncated);
    }
    if data[2..4] != SIZ_MARKER {
        return Err(RasterError::MissingHeader);
    }
    let width = read_u32(&data[8..12]).saturating_sub(read_u32(&data[16..20]));
    let height = read_u32(&data[12..16]).saturating_sub(read_u32(&data[20..24]));
    Ok((height, width))
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[0..8]);
    u64::from_be_bytes(buf)
}
