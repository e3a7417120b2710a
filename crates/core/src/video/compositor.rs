//! Composition math: letterbox scaling and picture-in-picture tile layout.

use super::{SourceOrder, VideoFrame};
use crate::protocol_constants::{PIP_PADDING_PX, PIP_WIDTH_FRACTION};

/// Composes a canvas frame from an ordered set of sources.
///
/// `sources` must already be sorted by ascending [`SourceOrder`] (lower
/// order renders first). The first source with a current frame becomes the
/// full-canvas presenter, letterboxed to preserve aspect ratio. Remaining
/// sources with a current frame are drawn as PiP tiles stacked from the
/// bottom-right corner upward, highest order closest to the corner. If
/// there isn't enough vertical room for every tile, the lowest-order
/// tiles are the ones dropped; the presenter and already-placed tiles are
/// never displaced to make room.
#[must_use]
pub fn compose(
    canvas_width: u32,
    canvas_height: u32,
    sources: &[(SourceOrder, Option<&VideoFrame>)],
) -> VideoFrame {
    let mut live = sources.iter().filter_map(|(order, frame)| frame.map(|f| (*order, f)));

    let mut canvas = match live.next() {
        Some((_, presenter)) => letterbox(presenter, canvas_width, canvas_height),
        None => VideoFrame::black(canvas_width, canvas_height),
    };

    let tile_width = ((f64::from(canvas_width) * PIP_WIDTH_FRACTION) as u32).max(2) & !1;
    let mut next_bottom = canvas_height.saturating_sub(PIP_PADDING_PX);

    // Walk the tiles highest order first, filling slots from the corner
    // upward, so the lowest-order tiles are the ones left over when the
    // column runs out of room.
    let tiles: Vec<_> = live.collect();
    for (_, frame) in tiles.iter().rev() {
        let tile_height = scaled_height(frame, tile_width);
        if next_bottom < tile_height || next_bottom - tile_height < PIP_PADDING_PX {
            break;
        }
        let tile_top = next_bottom - tile_height;
        let x = canvas_width.saturating_sub(PIP_PADDING_PX + tile_width);
        let resized = resize_yuv(frame, tile_width, tile_height);
        blit(&mut canvas, &resized, x, tile_top);
        next_bottom = tile_top.saturating_sub(PIP_PADDING_PX);
    }

    canvas
}

/// Scales `frame` to fit within `canvas_width`x`canvas_height` preserving
/// aspect ratio, centering the result with black letterbox/pillarbox bars.
fn letterbox(frame: &VideoFrame, canvas_width: u32, canvas_height: u32) -> VideoFrame {
    let scale = (f64::from(canvas_width) / f64::from(frame.width))
        .min(f64::from(canvas_height) / f64::from(frame.height));
    let new_w = ((f64::from(frame.width) * scale) as u32).max(2) & !1;
    let new_h = ((f64::from(frame.height) * scale) as u32).max(2) & !1;

    let mut canvas = VideoFrame::black(canvas_width, canvas_height);
    let resized = resize_yuv(frame, new_w, new_h);
    let x = (canvas_width.saturating_sub(new_w)) / 2;
    let y = (canvas_height.saturating_sub(new_h)) / 2;
    blit(&mut canvas, &resized, x & !1, y & !1);
    canvas
}

/// Height a PiP tile should have to preserve `frame`'s aspect ratio at the
/// given fixed `width`.
fn scaled_height(frame: &VideoFrame, width: u32) -> u32 {
    let aspect = f64::from(frame.height) / f64::from(frame.width);
    ((f64::from(width) * aspect) as u32).max(2) & !1
}

/// Bilinear resize of a planar YUV420P frame, plane by plane. Chroma is
/// carried through from the decoder (BT.601 matrix for these sources);
/// composition only rescales and copies planes, it never re-derives
/// chroma from RGB.
fn resize_yuv(frame: &VideoFrame, new_w: u32, new_h: u32) -> VideoFrame {
    if new_w == frame.width && new_h == frame.height {
        return frame.clone();
    }
    let mut out = VideoFrame::black(new_w, new_h);
    resize_plane(&frame.y, frame.width, frame.height, &mut out.y, new_w, new_h);

    let (cw, ch) = (frame.width.div_ceil(2), frame.height.div_ceil(2));
    let (ncw, nch) = (new_w.div_ceil(2), new_h.div_ceil(2));
    resize_plane(&frame.u, cw, ch, &mut out.u, ncw, nch);
    resize_plane(&frame.v, cw, ch, &mut out.v, ncw, nch);
    out
}

fn resize_plane(src: &[u8], src_w: u32, src_h: u32, dst: &mut [u8], dst_w: u32, dst_h: u32) {
    if src_w == 0 || src_h == 0 || dst_w == 0 || dst_h == 0 {
        return;
    }
    let sample = |x: u32, y: u32| -> f64 {
        let idx = (y.min(src_h - 1) * src_w + x.min(src_w - 1)) as usize;
        src.get(idx).copied().unwrap_or(0) as f64
    };
    for dy in 0..dst_h {
        // Pixel-center mapping keeps edges from over-weighting one row.
        let fy = ((f64::from(dy) + 0.5) * f64::from(src_h) / f64::from(dst_h) - 0.5).max(0.0);
        let y0 = fy.floor() as u32;
        let wy = fy - f64::from(y0);
        for dx in 0..dst_w {
            let fx = ((f64::from(dx) + 0.5) * f64::from(src_w) / f64::from(dst_w) - 0.5).max(0.0);
            let x0 = fx.floor() as u32;
            let wx = fx - f64::from(x0);

            let top = sample(x0, y0) * (1.0 - wx) + sample(x0 + 1, y0) * wx;
            let bottom = sample(x0, y0 + 1) * (1.0 - wx) + sample(x0 + 1, y0 + 1) * wx;
            let value = top * (1.0 - wy) + bottom * wy;

            let dst_idx = (dy * dst_w + dx) as usize;
            if let Some(slot) = dst.get_mut(dst_idx) {
                *slot = value.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Copies `src` into `dst` at offset `(x, y)`, clipping to `dst`'s bounds.
fn blit(dst: &mut VideoFrame, src: &VideoFrame, x: u32, y: u32) {
    blit_plane(&mut dst.y, dst.width, dst.height, &src.y, src.width, src.height, x, y);

    let (dcw, dch) = (dst.width.div_ceil(2), dst.height.div_ceil(2));
    let (scw, sch) = (src.width.div_ceil(2), src.height.div_ceil(2));
    blit_plane(&mut dst.u, dcw, dch, &src.u, scw, sch, x / 2, y / 2);
    blit_plane(&mut dst.v, dcw, dch, &src.v, scw, sch, x / 2, y / 2);
}

#[allow(clippy::too_many_arguments)]
fn blit_plane(
    dst: &mut [u8],
    dst_w: u32,
    dst_h: u32,
    src: &[u8],
    src_w: u32,
    src_h: u32,
    x: u32,
    y: u32,
) {
    for row in 0..src_h {
        let dy = y + row;
        if dy >= dst_h {
            break;
        }
        for col in 0..src_w {
            let dx = x + col;
            if dx >= dst_w {
                break;
            }
            let src_idx = (row * src_w + col) as usize;
            let dst_idx = (dy * dst_w + dx) as usize;
            if let (Some(&v), Some(slot)) = (src.get(src_idx), dst.get_mut(dst_idx)) {
                *slot = v;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, luma: u8) -> VideoFrame {
        let mut f = VideoFrame::black(width, height);
        f.y.iter_mut().for_each(|p| *p = luma);
        f
    }

    #[test]
    fn no_sources_produces_black_canvas() {
        let out = compose(1280, 720, &[]);
        assert!(out.y.iter().all(|&p| p == 0));
    }

    #[test]
    fn single_source_fills_canvas_aspect_preserved() {
        let frame = solid_frame(640, 480, 200);
        let out = compose(1280, 720, &[(0, Some(&frame))]);
        assert_eq!(out.width, 1280);
        assert_eq!(out.height, 720);
        // Center pixel should come from the scaled presenter, not be black.
        let center_idx = (360 * 1280 + 640) as usize;
        assert_eq!(out.y[center_idx], 200);
    }

    #[test]
    fn second_source_becomes_pip_tile_bottom_right() {
        let presenter = solid_frame(640, 480, 50);
        let pip = solid_frame(640, 480, 250);
        let out = compose(1280, 720, &[(0, Some(&presenter)), (1, Some(&pip))]);
        // Bottom-right corner pixel should belong to the PiP tile.
        let corner_idx = ((720 - 15) * 1280 + (1280 - 15)) as usize;
        assert_eq!(out.y[corner_idx], 250);
    }

    #[test]
    fn pip_tile_geometry_is_quarter_width_with_edge_padding() {
        // Presenter 640x480 letterboxes to 960x720 centered at x=160..1120.
        // PiP 640x480 becomes a 320x240 tile at x=950..1270, y=470..710.
        let presenter = solid_frame(640, 480, 50);
        let pip = solid_frame(640, 480, 250);
        let out = compose(1280, 720, &[(0, Some(&presenter)), (1, Some(&pip))]);

        let luma = |x: u32, y: u32| out.y[(y * 1280 + x) as usize];
        // Just inside the tile's left edge.
        assert_eq!(luma(955, 705), 250);
        // Just left of the tile: presenter pixels.
        assert_eq!(luma(945, 705), 50);
        // Right padding strip between tile and canvas edge stays presenter-free
        // (x > 1120 is outside the letterboxed presenter, so black).
        assert_eq!(luma(1275, 705), 0);
        // Above the tile's top edge, outside the presenter: black.
        assert_eq!(luma(1265, 460), 0);
        // Inside the tile's top edge.
        assert_eq!(luma(1265, 475), 250);
    }

    #[test]
    fn overflowing_tiles_drop_lowest_order_first() {
        // Each 640x480 tile is 320x240 plus 10px padding. Two tiles fit in
        // 720px (2*250 + 10 = 510); four do not - the two highest-order
        // tiles render and orders 1 and 2 are dropped.
        let presenter = solid_frame(640, 480, 10);
        let tile_frames: Vec<_> = (0..4).map(|i| solid_frame(640, 480, 100 + i)).collect();
        let mut sources = vec![(0, Some(&presenter))];
        for (i, f) in tile_frames.iter().enumerate() {
            sources.push((i as u32 + 1, Some(f)));
        }
        let out = compose(1280, 720, &sources);

        let luma = |x: u32, y: u32| out.y[(y * 1280 + x) as usize];
        // Bottom tile: order 4, at y=470..710.
        assert_eq!(luma(1100, 700), 103);
        // Second tile: order 3, at y=220..460.
        assert_eq!(luma(1100, 450), 102);
        // No third tile above (only 210px of room left; a 240px tile
        // doesn't fit), so orders 1 and 2 never render: that region shows
        // the presenter.
        assert_eq!(luma(1100, 200), 10);
    }

    #[test]
    fn absent_source_does_not_produce_tile() {
        let presenter = solid_frame(640, 480, 50);
        let out = compose(1280, 720, &[(0, Some(&presenter)), (1, None)]);
        let corner_idx = ((720 - 15) * 1280 + (1280 - 15)) as usize;
        // With no second source, the corner remains part of the letterboxed
        // black background (presenter doesn't reach that far since 640x480
        // scaled to fit 1280x720 leaves it centered).
        assert_ne!(out.y[corner_idx], 50);
    }
}
