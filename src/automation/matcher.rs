use crate::core::frame::{Frame, Point, Region, Template};

/// Per-channel tolerance used when none is configured.
pub const DEFAULT_TOLERANCE: u8 = 30;

/// Staged approximate template search.
///
/// Candidates are visited top-left first, rows outer, and the first one that
/// survives every stage wins. Each stage is cheaper than the next:
/// the template's center pixel, a sparse grid of sample points, then every
/// pixel with an early-exit mismatch budget.
#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    /// Templates no larger than this on their short side are scanned pixel by pixel.
    pub fine_scan_max: u32,
    pub max_samples: usize,
    /// Share of sample points allowed to mismatch, in percent.
    pub sample_mismatch_pct: u32,
    /// Share of template pixels allowed to mismatch in full verification, in percent.
    pub pixel_mismatch_pct: u32,
}

impl Default for Matcher {
    fn default() -> Self {
        Self {
            fine_scan_max: 20,
            max_samples: 12,
            sample_mismatch_pct: 30,
            pixel_mismatch_pct: 35,
        }
    }
}

impl Matcher {
    /// Find `template` inside `frame`, which holds the pixels of `search_region`.
    ///
    /// Returns the template's center in absolute screen coordinates.
    pub fn find(&self, template: &Template, frame: &Frame, search_region: Region, tolerance: u8) -> Option<Point> {
        let (tw, th) = (template.width(), template.height());
        let fw = frame.width().min(search_region.width);
        let fh = frame.height().min(search_region.height);
        if tw == 0 || th == 0 || tw > fw || th > fh {
            return None;
        }

        let step = self.grid_step(tw, th) as usize;
        let samples = self.sample_points(tw, th);
        let center = (tw / 2, th / 2);
        let center_rgb = template.rgb(center.0, center.1);

        for y in (0..=fh - th).step_by(step) {
            for x in (0..=fw - tw).step_by(step) {
                if !within(center_rgb, frame.rgb(x + center.0, y + center.1), tolerance) {
                    continue;
                }
                if !self.samples_agree(template, frame, x, y, &samples, tolerance) {
                    continue;
                }
                if self.verify(template, frame, x, y, tolerance) {
                    return Some(Point::new(
                        search_region.x + (x + center.0) as i32,
                        search_region.y + (y + center.1) as i32,
                    ));
                }
            }
        }
        None
    }

    fn grid_step(&self, tw: u32, th: u32) -> u32 {
        let short = tw.min(th);
        if short <= self.fine_scan_max {
            1
        } else {
            (short / 6).max(1)
        }
    }

    /// Roughly a 3x3 grid over the template, corners and far edges included.
    fn sample_points(&self, tw: u32, th: u32) -> Vec<(u32, u32)> {
        let mut nx = tw.min(3);
        let mut ny = th.min(3);
        while (nx * ny) as usize > self.max_samples.max(1) {
            if nx >= ny {
                nx -= 1;
            } else {
                ny -= 1;
            }
        }
        (0..ny)
            .map(|j| spread(j, ny, th))
            .flat_map(|ty| (0..nx).map(move |i| (spread(i, nx, tw), ty)))
            .collect()
    }

    fn samples_agree(
        &self,
        template: &Template,
        frame: &Frame,
        x: u32,
        y: u32,
        samples: &[(u32, u32)],
        tolerance: u8,
    ) -> bool {
        let mismatches = samples
            .iter()
            .filter(|&&(tx, ty)| !within(template.rgb(tx, ty), frame.rgb(x + tx, y + ty), tolerance))
            .count();
        mismatches * 100 <= samples.len() * self.sample_mismatch_pct as usize
    }

    fn verify(&self, template: &Template, frame: &Frame, x: u32, y: u32, tolerance: u8) -> bool {
        let (tw, th) = (template.width(), template.height());
        let budget = (tw as u64 * th as u64 * self.pixel_mismatch_pct as u64 / 100) as usize;
        let mut mismatches = 0usize;

        for ty in 0..th {
            for tx in 0..tw {
                if !within(template.rgb(tx, ty), frame.rgb(x + tx, y + ty), tolerance) {
                    mismatches += 1;
                    if mismatches > budget {
                        return false;
                    }
                }
            }
        }
        true
    }
}

/// The `i`th of `n` evenly spaced positions spanning `0..dim`.
fn spread(i: u32, n: u32, dim: u32) -> u32 {
    if n <= 1 {
        dim / 2
    } else {
        i * (dim - 1) / (n - 1)
    }
}

#[inline]
fn within(a: [u8; 3], b: [u8; 3], tolerance: u8) -> bool {
    a.iter().zip(b.iter()).all(|(&p, &q)| p.abs_diff(q) <= tolerance)
}
