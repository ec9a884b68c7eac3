use serde::{Deserialize, Serialize};

pub const DEFAULT_SPLIT_PERCENT: f64 = 60.0;
pub const DEFAULT_SIDEBAR_WIDTH: u16 = 250;
pub const MIN_SIDEBAR_WIDTH: u16 = 180;
pub const MAX_SIDEBAR_WIDTH: u16 = 450;
const VERTICAL_MIN_PANEL_PX: f64 = 200.0;
const HORIZONTAL_MIN_PANEL_PX: f64 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutDirection {
    #[default]
    Vertical,
    Horizontal,
}

impl LayoutDirection {
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::Vertical => Self::Horizontal,
            Self::Horizontal => Self::Vertical,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vertical => "vertical",
            Self::Horizontal => "horizontal",
        }
    }

    fn min_panel_px(self) -> f64 {
        match self {
            Self::Vertical => VERTICAL_MIN_PANEL_PX,
            Self::Horizontal => HORIZONTAL_MIN_PANEL_PX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Drag {
    start_pos: f64,
    start_value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    direction: LayoutDirection,
    fullscreen: bool,
    split_percent: f64,
    sidebar_open: bool,
    sidebar_width: u16,
    split_drag: Option<Drag>,
    sidebar_drag: Option<Drag>,
}

impl Default for Layout {
    fn default() -> Self {
        Self::new(
            LayoutDirection::default(),
            DEFAULT_SPLIT_PERCENT,
            false,
            DEFAULT_SIDEBAR_WIDTH,
        )
    }
}

impl Layout {
    #[must_use]
    pub fn new(
        direction: LayoutDirection,
        split_percent: f64,
        sidebar_open: bool,
        sidebar_width: u16,
    ) -> Self {
        Self {
            direction,
            fullscreen: false,
            split_percent: split_percent.clamp(0.0, 100.0),
            sidebar_open,
            sidebar_width: sidebar_width.clamp(MIN_SIDEBAR_WIDTH, MAX_SIDEBAR_WIDTH),
            split_drag: None,
            sidebar_drag: None,
        }
    }

    #[must_use]
    pub fn direction(&self) -> LayoutDirection {
        self.direction
    }

    #[must_use]
    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    #[must_use]
    pub fn split_percent(&self) -> f64 {
        self.split_percent
    }

    #[must_use]
    pub fn sidebar_open(&self) -> bool {
        self.sidebar_open
    }

    #[must_use]
    pub fn sidebar_width(&self) -> u16 {
        self.sidebar_width
    }

    pub fn toggle_direction(&mut self) {
        self.fullscreen = false;
        self.direction = self.direction.toggled();
    }

    pub fn toggle_fullscreen(&mut self) {
        self.fullscreen = !self.fullscreen;
    }

    pub fn set_fullscreen(&mut self, fullscreen: bool) {
        self.fullscreen = fullscreen;
    }

    /// Flips the direction. Returns `true` when the caller should bring the
    /// results panel forward: leaving vertical mode with results on screen.
    pub fn toggle_output_mode(&mut self, has_results: bool, is_loading: bool) -> bool {
        let was_vertical = self.direction == LayoutDirection::Vertical;
        self.toggle_direction();
        was_vertical && has_results && !is_loading
    }

    pub fn check_exit_fullscreen(&mut self, has_results: bool) {
        if !has_results && self.fullscreen {
            self.fullscreen = false;
        }
    }

    pub fn begin_split_resize(&mut self, pointer_pos: f64) {
        self.split_drag = Some(Drag {
            start_pos: pointer_pos,
            start_value: self.split_percent,
        });
    }

    pub fn split_resize_to(&mut self, pointer_pos: f64, container_px: f64) {
        let Some(drag) = self.split_drag else {
            return;
        };
        if container_px <= 0.0 {
            return;
        }

        let min_px = self.direction.min_panel_px();
        let max_px = container_px - min_px;
        let start_px = container_px * drag.start_value / 100.0;
        let wanted_px = start_px + (pointer_pos - drag.start_pos);
        let bounded_px = if wanted_px < min_px {
            min_px
        } else if wanted_px > max_px {
            max_px
        } else {
            wanted_px
        };
        self.split_percent = bounded_px / container_px * 100.0;
    }

    pub fn end_split_resize(&mut self) {
        self.split_drag = None;
    }

    pub fn set_sidebar_open(&mut self, open: bool) {
        self.sidebar_open = open;
    }

    pub fn toggle_sidebar(&mut self) {
        self.sidebar_open = !self.sidebar_open;
    }

    pub fn begin_sidebar_resize(&mut self, pointer_x: f64) {
        self.sidebar_drag = Some(Drag {
            start_pos: pointer_x,
            start_value: f64::from(self.sidebar_width),
        });
    }

    pub fn sidebar_resize_to(&mut self, pointer_x: f64) {
        let Some(drag) = self.sidebar_drag else {
            return;
        };
        let wanted = drag.start_value + (pointer_x - drag.start_pos);
        self.sidebar_width = clamp_sidebar_width(wanted);
    }

    pub fn end_sidebar_resize(&mut self) {
        self.sidebar_drag = None;
    }

    #[must_use]
    pub fn is_resizing(&self) -> bool {
        self.split_drag.is_some() || self.sidebar_drag.is_some()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_sidebar_width(width: f64) -> u16 {
    width
        .round()
        .clamp(f64::from(MIN_SIDEBAR_WIDTH), f64::from(MAX_SIDEBAR_WIDTH)) as u16
}
