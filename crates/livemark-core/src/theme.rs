use ratatui::style::Modifier;
use ratatui::style::Style;

#[derive(Clone, Debug)]
pub struct Theme {
    pub text_primary: Style,
    pub text_muted: Style,
    pub accent: Style,
    pub danger: Style,
    pub code_inline: Style,
    pub heading: Style,
    pub status: Style,
}

impl Default for Theme {
    fn default() -> Self {
        use ratatui::style::Stylize;

        Self {
            text_primary: Style::default(),
            text_muted: Style::default().dark_gray(),
            accent: Style::default().cyan(),
            danger: Style::default().red(),
            code_inline: Style::default().cyan(),
            heading: Style::default().add_modifier(Modifier::BOLD),
            status: Style::default().reversed(),
        }
    }
}
