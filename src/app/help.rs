use eframe::egui;

pub(super) fn draw_help_window(ctx: &egui::Context, open: &mut bool) {
    egui::Window::new("Help")
        .open(open)
        .resizable(true)
        .default_width(520.0)
        .default_height(440.0)
        .show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.heading("Configure mode");
                ui.separator();
                help_row(ui, "Right-click page", "Open the placement menu at that spot");
                help_row(ui, "Type in menu", "Filter fields and roles");
                help_row(ui, "↑ / ↓, Enter", "Pick a field and place it");
                help_row(ui, "Click outside", "Close the menu without placing");
                help_row(ui, "Drag ◤ handle", "Move a field");
                help_row(ui, "Drag ◢ handle", "Resize a field from its top-left corner");
                help_row(ui, "Click a field", "Edit field, role and required flag");

                ui.add_space(10.0);
                ui.heading("Sign mode");
                ui.separator();
                help_row(ui, "Click a field", "Fill it in");
                help_row(ui, "Tab", "Jump to the next field across pages");
                help_row(ui, "Enter", "Commit text, or open the signature pad");
                help_row(ui, "Sign", "Enabled once every required field is filled");

                ui.add_space(10.0);
                ui.heading("General");
                ui.separator();
                help_row(ui, "F1", "Toggle this window");
                help_row(ui, "Escape", "Cancel the current gesture");
                help_row(ui, "⌘+ / ⌘-", "Zoom pages");

                ui.add_space(20.0);
                ui.heading("Settings");
                ui.separator();
                ui.label("Settings are read from ~/.config/fieldsign.toml or ./settings.toml:");
                ui.add_space(5.0);
                ui.code(r##"backend_url = "http://localhost:8069"
model = "sign.oca.request"
record_id = 1
pages_dir = "pages"
mode = "sign"
# fixture = "document.json""##);
                ui.add_space(5.0);
                ui.label("Command-line flags override the file. See fieldsign --help.");

                ui.add_space(20.0);
                ui.heading("Tips");
                ui.separator();
                ui.label("• Pages are pre-rendered images (png or jpg) sorted by file name");
                ui.label("• Changes are saved as you make them; failed saves are reverted");
                ui.label("• Set RUST_LOG=fieldsign=debug for detailed logs");
            });
        });
}

fn help_row(ui: &mut egui::Ui, shortcut: &str, description: &str) {
    ui.horizontal(|ui| {
        ui.add_sized([130.0, 16.0], egui::Label::new(
            egui::RichText::new(shortcut).monospace().strong()
        ));
        ui.label(description);
    });
}
