use super::{FieldContext, FieldOutput, FieldType, field_widget_id, paint_placeholder};
use crate::model::{FieldKind, FieldValue, Item};
use eframe::egui;

pub struct TextField;

impl FieldType for TextField {
    fn kind(&self) -> FieldKind {
        FieldKind::Text
    }

    fn generate(
        &self,
        ui: &mut egui::Ui,
        ctx: &FieldContext<'_>,
        item: &Item,
        rect: egui::Rect,
    ) -> FieldOutput {
        if !ctx.editable {
            paint_placeholder(ui, item, rect);
            return FieldOutput::default();
        }

        let id = field_widget_id(item.id);
        let buffer_id = id.with("buffer");
        let stored = item.value_text.clone().unwrap_or_default();
        let mut buffer = ui
            .data_mut(|d| d.get_temp::<String>(buffer_id))
            .unwrap_or_else(|| stored.clone());

        let advance = ui.memory(|m| m.has_focus(id))
            && ui.input_mut(|i| i.consume_key(egui::Modifiers::NONE, egui::Key::Tab));

        let font = egui::FontId::proportional((rect.height() * 0.7).clamp(8.0, 18.0));
        let response = ui.put(
            rect,
            egui::TextEdit::singleline(&mut buffer)
                .id(id)
                .font(font)
                .hint_text(item.name.as_str())
                .lock_focus(true)
                .desired_width(rect.width()),
        );

        if response.gained_focus() && buffer.is_empty() {
            if let Some(default) = ctx.info.default_for(item) {
                buffer = default.to_string();
            }
        }

        let mut output = FieldOutput {
            advance,
            ..Default::default()
        };
        if (response.lost_focus() || advance) && buffer != stored {
            output.commit = Some(FieldValue::Text(buffer.clone()));
        }

        if response.has_focus() && !advance {
            ui.data_mut(|d| d.insert_temp(buffer_id, buffer));
        } else {
            ui.data_mut(|d| d.remove::<String>(buffer_id));
        }
        output
    }

    fn check(&self, item: &Item) -> bool {
        item.value_text.as_deref().is_some_and(|text| !text.is_empty())
    }
}
