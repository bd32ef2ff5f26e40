use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const CAROUSEL_PREV: &str = "carousel_prev";
    pub const CAROUSEL_NEXT: &str = "carousel_next";
    pub const CAROUSEL_CLOSE: &str = "carousel_close";
    pub const CAROUSEL_INFO: &str = "carousel_info";
    /// Seguido de `:{indice}`
    pub const CAROUSEL_SELECT: &str = "carousel_select";
}

/// Acción pedida por un botón de carrusel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarouselAction {
    Previous,
    Next,
    Select(usize),
    Close,
}

impl CarouselAction {
    /// Interpreta el `custom_id` de un botón. `None` si no es de carrusel.
    pub fn parse(custom_id: &str) -> Option<Self> {
        match custom_id {
            button_ids::CAROUSEL_PREV => Some(Self::Previous),
            button_ids::CAROUSEL_NEXT => Some(Self::Next),
            button_ids::CAROUSEL_CLOSE => Some(Self::Close),
            other => other
                .strip_prefix(button_ids::CAROUSEL_SELECT)
                .and_then(|rest| rest.strip_prefix(':'))
                .and_then(|index| index.parse().ok())
                .map(Self::Select),
        }
    }
}

fn select_id(index: usize) -> String {
    format!("{}:{}", button_ids::CAROUSEL_SELECT, index)
}

/// Controles de navegación de un carrusel en la página `index` de `total`
pub fn carousel_buttons(index: usize, total: usize) -> Vec<CreateActionRow> {
    let prev_btn = CreateButton::new(button_ids::CAROUSEL_PREV)
        .emoji('◀')
        .style(ButtonStyle::Primary)
        .disabled(index == 0);

    let page_btn = CreateButton::new(button_ids::CAROUSEL_INFO)
        .label(format!("{}/{}", index + 1, total))
        .style(ButtonStyle::Secondary)
        .disabled(true);

    let next_btn = CreateButton::new(button_ids::CAROUSEL_NEXT)
        .emoji('▶')
        .style(ButtonStyle::Primary)
        .disabled(index + 1 >= total);

    let select_btn = CreateButton::new(select_id(index))
        .label("Reproducir")
        .emoji('🎵')
        .style(ButtonStyle::Success);

    let close_btn = CreateButton::new(button_ids::CAROUSEL_CLOSE)
        .label("Cerrar")
        .style(ButtonStyle::Danger);

    vec![CreateActionRow::Buttons(vec![
        prev_btn, page_btn, next_btn, select_btn, close_btn,
    ])]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_navigation_ids() {
        assert_eq!(CarouselAction::parse("carousel_prev"), Some(CarouselAction::Previous));
        assert_eq!(CarouselAction::parse("carousel_next"), Some(CarouselAction::Next));
        assert_eq!(CarouselAction::parse("carousel_close"), Some(CarouselAction::Close));
    }

    #[test]
    fn test_parse_select_index() {
        assert_eq!(
            CarouselAction::parse(&select_id(7)),
            Some(CarouselAction::Select(7))
        );
        assert_eq!(CarouselAction::parse("carousel_select:"), None);
        assert_eq!(CarouselAction::parse("carousel_select7"), None);
        assert_eq!(CarouselAction::parse("carousel_info"), None);
        assert_eq!(CarouselAction::parse("player_skip"), None);
    }
}
