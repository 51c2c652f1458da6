//! QR rendering for the pairing handshake.

use mamaz_core::error::RelayError;
use qrcode::{Color, EcLevel, QrCode};

const MODULE_PX: u32 = 10;
const QUIET_ZONE: u32 = 2;

fn encode(data: &str) -> Result<QrCode, RelayError> {
    QrCode::with_error_correction_level(data.as_bytes(), EcLevel::L)
        .map_err(|e| RelayError::Automation(format!("QR generation failed: {e}")))
}

/// Render pairing data as a PNG with a white quiet zone.
pub fn render_png(data: &str) -> Result<Vec<u8>, RelayError> {
    use image::{ImageBuffer, Luma};

    let code = encode(data)?;
    let modules = code.width() as u32;
    let side = (modules + QUIET_ZONE * 2) * MODULE_PX;

    let img = ImageBuffer::from_fn(side, side, |x, y| {
        let (cx, cy) = (x / MODULE_PX, y / MODULE_PX);
        let inside = (QUIET_ZONE..QUIET_ZONE + modules).contains(&cx)
            && (QUIET_ZONE..QUIET_ZONE + modules).contains(&cy);
        if inside
            && code[((cx - QUIET_ZONE) as usize, (cy - QUIET_ZONE) as usize)] == Color::Dark
        {
            Luma([0u8])
        } else {
            Luma([255u8])
        }
    });

    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| RelayError::Automation(format!("PNG encoding failed: {e}")))?;
    Ok(buf.into_inner())
}

/// Render pairing data for a terminal, two module rows per text line.
pub fn render_terminal(data: &str) -> Result<String, RelayError> {
    let code = encode(data)?;
    let width = code.width();
    let colors = code.into_colors();
    let dark = |row: usize, col: usize| row < width && colors[row * width + col] == Color::Dark;

    let mut out = String::with_capacity((width + 1) * width.div_ceil(2));
    for row in (0..width).step_by(2) {
        for col in 0..width {
            out.push(match (dark(row, col), dark(row + 1, col)) {
                (true, true) => '█',
                (true, false) => '▀',
                (false, true) => '▄',
                (false, false) => ' ',
            });
        }
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_png_signature_and_size() {
        let png = render_png("2@abc,def,ghi").unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let img = image::load_from_memory(&png).unwrap();
        assert_eq!(img.width(), img.height());
        assert_eq!(img.width() % MODULE_PX, 0);
    }

    #[test]
    fn test_terminal_half_height() {
        let text = render_terminal("2@abc,def,ghi").unwrap();
        let lines: Vec<&str> = text.lines().collect();
        let width = lines[0].chars().count();
        assert_eq!(lines.len(), width.div_ceil(2));
        assert!(text.contains('█'));
    }
}
