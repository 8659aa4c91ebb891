use super::{FieldContext, FieldOutput, FieldType, field_widget_id, paint_placeholder};
use crate::error::Result;
use crate::model::{FieldKind, Item, ItemId};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use eframe::egui;
use std::hash::{DefaultHasher, Hash, Hasher};
use tracing::warn;

pub struct SignatureField;

impl FieldType for SignatureField {
    fn kind(&self) -> FieldKind {
        FieldKind::Signature
    }

    fn generate(
        &self,
        ui: &mut egui::Ui,
        ctx: &FieldContext<'_>,
        item: &Item,
        rect: egui::Rect,
    ) -> FieldOutput {
        let id = field_widget_id(item.id);
        let sense = if ctx.editable {
            egui::Sense::click()
        } else {
            egui::Sense::hover()
        };
        let response = ui.interact(rect, id, sense);

        let texture = item
            .value_binary
            .as_deref()
            .and_then(|data| preview_texture(ui.ctx(), item.id, data));
        match texture {
            Some(texture) => {
                let painter = ui.painter_at(rect);
                let size = texture.size_vec2();
                let scale = (rect.width() / size.x).min(rect.height() / size.y);
                let target = egui::Rect::from_center_size(rect.center(), size * scale);
                painter.image(
                    texture.id(),
                    target,
                    egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                    egui::Color32::WHITE,
                );
            }
            None => paint_placeholder(ui, item, rect),
        }
        if response.has_focus() {
            ui.painter().rect_stroke(
                rect,
                2.0,
                egui::Stroke::new(1.5, egui::Color32::from_rgb(90, 160, 255)),
                egui::StrokeKind::Outside,
            );
        }

        let mut output = FieldOutput::default();
        if !ctx.editable {
            return output;
        }
        if response.has_focus() {
            output.advance =
                ui.input_mut(|i| i.consume_key(egui::Modifiers::NONE, egui::Key::Tab));
            output.open_pad =
                ui.input_mut(|i| i.consume_key(egui::Modifiers::NONE, egui::Key::Enter));
        }
        output.open_pad |= response.clicked();
        output
    }

    fn check(&self, item: &Item) -> bool {
        item.value_binary.as_deref().is_some_and(|data| !data.is_empty())
    }
}

/// Decoded signature of one item, tagged with the payload it came from.
#[derive(Clone)]
struct Preview {
    payload: u64,
    texture: Option<egui::TextureHandle>,
}

/// One texture per item; a new payload replaces the old texture, which frees it.
fn preview_texture(ctx: &egui::Context, item: ItemId, data: &str) -> Option<egui::TextureHandle> {
    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    let payload = hasher.finish();
    let key = egui::Id::new(("signature_preview", item));
    if let Some(cached) = ctx.data_mut(|d| d.get_temp::<Preview>(key))
        && cached.payload == payload
    {
        return cached.texture;
    }
    let texture = match decode_signature(data) {
        Ok(image) => Some(ctx.load_texture(
            format!("signature-{item}"),
            image,
            egui::TextureOptions::LINEAR,
        )),
        Err(e) => {
            warn!(item, error = %e, "could not decode stored signature");
            None
        }
    };
    ctx.data_mut(|d| {
        d.insert_temp(
            key,
            Preview {
                payload,
                texture: texture.clone(),
            },
        )
    });
    texture
}

pub fn decode_signature(data: &str) -> Result<egui::ColorImage> {
    let bytes = STANDARD.decode(data.trim())?;
    let image = image::load_from_memory(&bytes)?.to_rgba8();
    let size = [image.width() as usize, image.height() as usize];
    Ok(egui::ColorImage::from_rgba_unmultiplied(size, image.as_raw()))
}

const INK: [u8; 4] = [20, 30, 110, 255];

/// Freehand strokes captured in unit coordinates of the pad.
#[derive(Clone, Debug, Default)]
pub struct SignaturePad {
    strokes: Vec<Vec<egui::Pos2>>,
    current: Vec<egui::Pos2>,
}

impl SignaturePad {
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty() && self.current.is_empty()
    }

    pub fn clear(&mut self) {
        self.strokes.clear();
        self.current.clear();
    }

    pub fn push_point(&mut self, unit: egui::Pos2) {
        self.current
            .push(egui::pos2(unit.x.clamp(0.0, 1.0), unit.y.clamp(0.0, 1.0)));
    }

    pub fn end_stroke(&mut self) {
        if !self.current.is_empty() {
            self.strokes.push(std::mem::take(&mut self.current));
        }
    }

    pub fn ui(&mut self, ui: &mut egui::Ui, size: egui::Vec2) -> egui::Response {
        let (response, painter) = ui.allocate_painter(size, egui::Sense::drag());
        let rect = response.rect;
        painter.rect_filled(rect, 4.0, egui::Color32::WHITE);
        painter.rect_stroke(
            rect,
            4.0,
            egui::Stroke::new(1.0, egui::Color32::GRAY),
            egui::StrokeKind::Inside,
        );

        if let Some(pos) = response.interact_pointer_pos() {
            if response.dragged() || response.drag_started() {
                let unit = egui::pos2(
                    (pos.x - rect.min.x) / rect.width(),
                    (pos.y - rect.min.y) / rect.height(),
                );
                self.push_point(unit);
            }
        }
        if response.drag_stopped() {
            self.end_stroke();
        }

        let ink = egui::Stroke::new(2.0, egui::Color32::from_rgb(INK[0], INK[1], INK[2]));
        let to_screen = |p: &egui::Pos2| {
            egui::pos2(
                rect.min.x + p.x * rect.width(),
                rect.min.y + p.y * rect.height(),
            )
        };
        for stroke in self.strokes.iter().chain(std::iter::once(&self.current)) {
            let points: Vec<egui::Pos2> = stroke.iter().map(to_screen).collect();
            if points.len() > 1 {
                painter.add(egui::Shape::line(points, ink));
            }
        }
        response
    }

    pub fn rasterize(&self, width: u32, height: u32) -> image::RgbaImage {
        let mut canvas = image::RgbaImage::new(width.max(1), height.max(1));
        let radius = (width.min(height) as f32 / 60.0).max(1.0);
        let scale = egui::vec2(width as f32, height as f32);
        for stroke in self.strokes.iter().chain(std::iter::once(&self.current)) {
            let points: Vec<egui::Pos2> = stroke
                .iter()
                .map(|p| egui::pos2(p.x * scale.x, p.y * scale.y))
                .collect();
            match points.as_slice() {
                [] => {}
                [single] => stamp(&mut canvas, *single, radius),
                _ => {
                    for pair in points.windows(2) {
                        let (a, b) = (pair[0], pair[1]);
                        let steps = a.distance(b).ceil().max(1.0) as usize;
                        for step in 0..=steps {
                            stamp(&mut canvas, a.lerp(b, step as f32 / steps as f32), radius);
                        }
                    }
                }
            }
        }
        canvas
    }

    pub fn to_png_base64(&self, width: u32, height: u32) -> Result<String> {
        let canvas = self.rasterize(width, height);
        let mut png = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(canvas).write_to(&mut png, image::ImageFormat::Png)?;
        Ok(STANDARD.encode(png.into_inner()))
    }
}

fn stamp(canvas: &mut image::RgbaImage, center: egui::Pos2, radius: f32) {
    let (w, h) = (canvas.width() as i64, canvas.height() as i64);
    let r = radius.ceil() as i64;
    let (cx, cy) = (center.x.round() as i64, center.y.round() as i64);
    for y in (cy - r).max(0)..=(cy + r).min(h - 1) {
        for x in (cx - r).max(0)..=(cx + r).min(w - 1) {
            let (dx, dy) = ((x - cx) as f32, (y - cy) as f32);
            if dx * dx + dy * dy <= radius * radius {
                canvas.put_pixel(x as u32, y as u32, image::Rgba(INK));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::text_item;

    #[test]
    fn drawn_strokes_survive_png_round_trip() {
        let mut pad = SignaturePad::default();
        pad.push_point(egui::pos2(0.1, 0.5));
        pad.push_point(egui::pos2(0.9, 0.5));
        pad.end_stroke();
        let encoded = pad.to_png_base64(120, 40).unwrap();
        let image = decode_signature(&encoded).unwrap();
        assert_eq!(image.size, [120, 40]);
        let inked = image.pixels.iter().filter(|c| c.a() > 0).count();
        assert!(inked > 80, "expected a visible stroke, got {inked} pixels");
    }

    #[test]
    fn points_are_clamped_to_the_pad() {
        let mut pad = SignaturePad::default();
        pad.push_point(egui::pos2(-1.0, 3.0));
        pad.end_stroke();
        let canvas = pad.rasterize(10, 10);
        assert_eq!(canvas.get_pixel(0, 9).0, INK);
    }

    #[test]
    fn signature_check_looks_at_binary_value() {
        let mut item = text_item(1, 1, 1);
        item.field_type = FieldKind::Signature;
        item.value_text = Some("ignored".into());
        assert!(!SignatureField.check(&item));
        item.value_binary = Some("iVBORw0KGgo=".into());
        assert!(SignatureField.check(&item));
    }

    #[test]
    fn new_signature_replaces_cached_texture() {
        let ctx = egui::Context::default();
        let first = SignaturePad::default().to_png_base64(4, 4).unwrap();
        let second = SignaturePad::default().to_png_base64(6, 6).unwrap();

        let texture = preview_texture(&ctx, 1, &first).unwrap();
        let first_id = texture.id();
        drop(texture);
        assert_eq!(preview_texture(&ctx, 1, &first).unwrap().id(), first_id);
        let allocated = ctx.tex_manager().read().num_allocated();

        let texture = preview_texture(&ctx, 1, &second).unwrap();
        assert_eq!(texture.size(), [6, 6]);
        drop(texture);
        assert_eq!(ctx.tex_manager().read().num_allocated(), allocated);
    }

    #[test]
    fn garbage_signature_data_is_an_error() {
        assert!(decode_signature("not base64!").is_err());
    }
}
