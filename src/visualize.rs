use crate::diagram::Diagram;
use crate::render::{self, CANVAS};
use anyhow::{Context, Result, bail};
use minifb::{Key, KeyRepeat, Window, WindowOptions};

/// Show rendered diagrams in a window. Left/Right switch between them,
/// Esc or q closes the window.
pub fn show_diagrams(diagrams: &[Diagram]) -> Result<()> {
    if diagrams.is_empty() {
        bail!("Nothing to preview: no diagrams were produced.");
    }

    let (width, height) = (CANVAS.0 as usize, CANVAS.1 as usize);
    let mut frames = Vec::with_capacity(diagrams.len());
    for diagram in diagrams {
        let mut rgb = vec![0u8; width * height * 3];
        render::render_to_rgb(diagram, &mut rgb, CANVAS)
            .with_context(|| format!("Failed to render preview of {}", diagram.title))?;
        frames.push(rgb_to_pixels(&rgb));
    }

    let title = |i: usize| format!("Taylor diagram {} ({}/{})", diagrams[i].title, i + 1, diagrams.len());
    let mut current = 0;
    let mut window = Window::new(&title(current), width, height, WindowOptions::default()).with_context(
        || "Failed to create window (is an X server available, and is $DISPLAY set?)",
    )?;
    window.set_target_fps(60);

    while window.is_open() {
        if window.is_key_down(Key::Escape) || window.is_key_down(Key::Q) {
            break;
        }

        let previous = current;
        if window.is_key_pressed(Key::Right, KeyRepeat::No) {
            current = (current + 1) % frames.len();
        }
        if window.is_key_pressed(Key::Left, KeyRepeat::No) {
            current = (current + frames.len() - 1) % frames.len();
        }
        if current != previous {
            window.set_title(&title(current));
        }

        window
            .update_with_buffer(&frames[current], width, height)
            .context("Failed to update window buffer")?;
    }

    Ok(())
}

/// Pack an RGB byte buffer into minifb's 0RGB pixels.
fn rgb_to_pixels(rgb: &[u8]) -> Vec<u32> {
    rgb.chunks_exact(3).map(|px| rgb_u32(px[0], px[1], px[2])).collect()
}

fn rgb_u32(r: u8, g: u8, b: u8) -> u32 {
    (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_to_pixels() {
        let pixels = rgb_to_pixels(&[255, 0, 0, 0, 128, 255]);
        assert_eq!(pixels, vec![0x00FF_0000, 0x0000_80FF]);
    }
}
