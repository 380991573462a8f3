use crate::transcript::EntryKind;
use eframe::egui::{self, Color32, CornerRadius, FontId, Frame, Margin, Stroke, TextStyle};

#[derive(Debug, Clone)]
pub struct Theme {
    pub surface_0: Color32,
    pub surface_1: Color32,
    pub surface_2: Color32,
    pub surface_3: Color32,
    pub accent_user: Color32,
    pub accent_agent: Color32,
    pub new_session: Color32,
    pub danger: Color32,
    pub text_primary: Color32,
    pub text_muted: Color32,
    pub code_fill: Color32,
    pub spacing_8: f32,
    pub spacing_12: f32,
    pub radius_8: u8,
    pub radius_12: u8,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            surface_0: Color32::from_rgb(0x17, 0x17, 0x17),
            surface_1: Color32::from_rgb(0x1E, 0x1E, 0x1E),
            surface_2: Color32::from_rgb(0x2A, 0x2A, 0x2E),
            surface_3: Color32::from_rgb(0x33, 0x33, 0x33),
            accent_user: Color32::from_rgb(0x4C, 0xC9, 0xF0),
            accent_agent: Color32::from_rgb(0xF7, 0x25, 0x85),
            new_session: Color32::from_rgb(0x23, 0x86, 0x36),
            danger: Color32::from_rgb(0x99, 0x00, 0x00),
            text_primary: Color32::from_rgb(0xE6, 0xED, 0xF3),
            text_muted: Color32::from_rgb(0x77, 0x77, 0x77),
            code_fill: Color32::from_rgb(0x12, 0x12, 0x14),
            spacing_8: 8.0,
            spacing_12: 12.0,
            radius_8: 8,
            radius_12: 12,
        }
    }
}

impl Theme {
    pub fn apply_visuals(&self, ctx: &egui::Context) {
        let mut visuals = egui::Visuals::dark();
        visuals.panel_fill = self.surface_1;
        visuals.override_text_color = Some(self.text_primary);
        visuals.widgets.noninteractive.bg_fill = self.surface_2;
        visuals.widgets.noninteractive.bg_stroke = Stroke::NONE;
        visuals.widgets.inactive.bg_fill = self.surface_2;
        visuals.widgets.inactive.weak_bg_fill = self.surface_2;
        visuals.widgets.inactive.bg_stroke = Stroke::NONE;
        visuals.widgets.hovered.bg_fill = self.surface_3;
        visuals.widgets.hovered.weak_bg_fill = self.surface_3;
        visuals.widgets.hovered.bg_stroke = Stroke::NONE;
        visuals.widgets.active.bg_fill = self.surface_3;
        visuals.widgets.active.bg_stroke = Stroke::NONE;
        visuals.selection.bg_fill = self.surface_3;
        visuals.window_fill = self.surface_1;
        visuals.window_corner_radius = CornerRadius::same(self.radius_8);

        let mut style = (*ctx.style()).clone();
        style.visuals = visuals;
        style.spacing.item_spacing = egui::vec2(8.0, 8.0);
        style.spacing.button_padding = egui::vec2(10.0, 6.0);
        style.text_styles.insert(TextStyle::Heading, FontId::proportional(17.0));
        style.text_styles.insert(TextStyle::Body, FontId::proportional(14.0));
        style.text_styles.insert(TextStyle::Monospace, FontId::monospace(13.0));
        style.text_styles.insert(TextStyle::Small, FontId::proportional(10.0));
        ctx.set_style(style);
    }

    pub fn entry_color(&self, kind: EntryKind) -> Color32 {
        match kind {
            EntryKind::User => self.accent_user,
            EntryKind::Agent => self.accent_agent,
            EntryKind::Notice => self.text_muted,
            EntryKind::Error => self.danger,
        }
    }

    pub fn entry_label(kind: EntryKind) -> &'static str {
        match kind {
            EntryKind::User => "USER ➤",
            EntryKind::Agent => "AGENT 🤖",
            EntryKind::Notice | EntryKind::Error => "",
        }
    }

    pub fn code_frame(&self) -> Frame {
        Frame::new()
            .fill(self.code_fill)
            .inner_margin(Margin::same(self.spacing_8 as i8))
            .corner_radius(CornerRadius::same(self.radius_8))
            .stroke(Stroke::NONE)
    }

    pub fn composer_frame(&self) -> Frame {
        Frame::new()
            .fill(self.surface_2)
            .inner_margin(Margin::symmetric(self.spacing_12 as i8, 10))
            .corner_radius(CornerRadius::same(self.radius_12))
            .stroke(Stroke::NONE)
    }
}
