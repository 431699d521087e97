use std::time::Instant;

use image::{Rgba, RgbaImage};
use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC, GetDIBits,
    ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, SRCCOPY,
};

use crate::core::frame::{Frame, Region};
use crate::error::{EngineError, Result};
use crate::platform::ScreenCapture;

/// Captures desktop regions with GDI.
pub struct GdiCapture;

impl ScreenCapture for GdiCapture {
    fn capture(&self, region: Region) -> Result<Frame> {
        if region.is_empty() {
            return Err(EngineError::CaptureFailed(format!("empty region {:?}", region)));
        }
        let image = capture_screen_region(region).map_err(EngineError::CaptureFailed)?;
        Ok(Frame::new(image, Instant::now()))
    }
}

/// Copy a screen region using BitBlt from the desktop DC.
fn capture_screen_region(region: Region) -> std::result::Result<RgbaImage, String> {
    let width = region.width as i32;
    let height = region.height as i32;

    unsafe {
        let desktop = HWND(0);
        let hdc = GetDC(desktop);
        if hdc.is_invalid() {
            return Err("Failed to get desktop device context".to_string());
        }

        let mem_dc = CreateCompatibleDC(hdc);
        if mem_dc.is_invalid() {
            let _ = ReleaseDC(desktop, hdc);
            return Err("Failed to create compatible DC".to_string());
        }

        let bitmap = CreateCompatibleBitmap(hdc, width, height);
        if bitmap.is_invalid() {
            let _ = DeleteDC(mem_dc);
            let _ = ReleaseDC(desktop, hdc);
            return Err("Failed to create compatible bitmap".to_string());
        }

        let old_bitmap = SelectObject(mem_dc, bitmap);

        let blit = BitBlt(mem_dc, 0, 0, width, height, hdc, region.x, region.y, SRCCOPY);
        if blit.is_err() {
            let _ = SelectObject(mem_dc, old_bitmap);
            let _ = DeleteObject(bitmap);
            let _ = DeleteDC(mem_dc);
            let _ = ReleaseDC(desktop, hdc);
            return Err("BitBlt failed - could not capture screen".to_string());
        }

        let mut bmi = BITMAPINFO {
            bmiHeader: BITMAPINFOHEADER {
                biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                biWidth: width,
                biHeight: -height, // top-down rows
                biPlanes: 1,
                biBitCount: 32, // BGRA
                biCompression: BI_RGB.0 as u32,
                biSizeImage: 0,
                biXPelsPerMeter: 0,
                biYPelsPerMeter: 0,
                biClrUsed: 0,
                biClrImportant: 0,
            },
            bmiColors: [Default::default(); 1],
        };

        let mut buffer: Vec<u8> = vec![0; (width * height * 4) as usize];
        let scan_lines = GetDIBits(
            mem_dc,
            bitmap,
            0,
            height as u32,
            Some(buffer.as_mut_ptr() as *mut _),
            &mut bmi,
            DIB_RGB_COLORS,
        );

        let _ = SelectObject(mem_dc, old_bitmap);
        let _ = DeleteObject(bitmap);
        let _ = DeleteDC(mem_dc);
        let _ = ReleaseDC(desktop, hdc);

        if scan_lines == 0 {
            return Err("Failed to get bitmap bits".to_string());
        }

        Ok(bgra_to_rgba(region.width, region.height, &buffer))
    }
}

fn bgra_to_rgba(width: u32, height: u32, buffer: &[u8]) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let i = ((y * width + x) * 4) as usize;
        Rgba([buffer[i + 2], buffer[i + 1], buffer[i], 255])
    })
}
