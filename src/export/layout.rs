//! Page geometry in PDF points. Rectangles use a top-left origin; the writer
//! flips them into PDF space.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

pub const A4: PageSize = PageSize {
    width: 595.28,
    height: 841.89,
};

pub const COVER_MARGIN: f64 = 24.0;
pub const LOGO_WIDTH: f64 = 180.0;
pub const LOGO_HEIGHT: f64 = 84.0;
/// Distance of the logo from the right page edge
pub const LOGO_RIGHT: f64 = 24.0;
pub const LOGO_GAP: f64 = 8.0;
pub const METADATA_FONT_SIZE: f64 = 9.0;
pub const METADATA_LINE_HEIGHT: f64 = 12.0;
pub const METADATA_GAP: f64 = 8.0;
pub const ATTACHMENT_MARGIN: f64 = 20.0;
pub const CAPTION_FONT_SIZE: f64 = 9.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl PageSize {
    pub fn oriented(self, orientation: Orientation) -> PageSize {
        let (short, long) = if self.width <= self.height {
            (self.width, self.height)
        } else {
            (self.height, self.width)
        };
        match orientation {
            Orientation::Portrait => PageSize {
                width: short,
                height: long,
            },
            Orientation::Landscape => PageSize {
                width: long,
                height: short,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }
}

/// Largest size with the image's aspect ratio that fits `max_width` x `max_height`
pub fn fit_within(image_width: u32, image_height: u32, max_width: f64, max_height: f64) -> (f64, f64) {
    if image_width == 0 || image_height == 0 {
        return (0.0, 0.0);
    }
    let (w, h) = (f64::from(image_width), f64::from(image_height));
    let scale = (max_width / w).min(max_height / h).max(0.0);
    (w * scale, h * scale)
}

#[derive(Debug, Clone, PartialEq)]
pub struct CoverLayout {
    pub page: PageSize,
    pub snapshot: Rect,
    pub logo: Option<Rect>,
    /// Baseline of each metadata line, top to bottom
    pub metadata_baselines: Vec<f64>,
}

/// Place the form snapshot, logo and metadata block on the cover page.
///
/// The logo sits in the top-right corner and pushes the snapshot down; the
/// metadata block is anchored to the bottom margin and the snapshot never
/// reaches into it.
pub fn cover_layout(
    page: PageSize,
    snapshot_width: u32,
    snapshot_height: u32,
    has_logo: bool,
    metadata_lines: usize,
) -> CoverLayout {
    let margin = COVER_MARGIN;

    let logo = has_logo.then(|| Rect {
        x: page.width - LOGO_RIGHT - LOGO_WIDTH,
        y: margin,
        width: LOGO_WIDTH,
        height: LOGO_HEIGHT,
    });

    let top = match logo {
        Some(rect) => rect.bottom() + LOGO_GAP,
        None => margin,
    };
    let reserved = if metadata_lines > 0 {
        metadata_lines as f64 * METADATA_LINE_HEIGHT + METADATA_GAP
    } else {
        0.0
    };

    let available_width = page.width - margin * 2.0;
    let available_height = (page.height - margin - top - reserved).max(0.0);
    let (width, height) = fit_within(
        snapshot_width,
        snapshot_height,
        available_width,
        available_height,
    );

    let last_baseline = page.height - margin;
    let metadata_baselines = (0..metadata_lines)
        .map(|i| last_baseline - (metadata_lines - 1 - i) as f64 * METADATA_LINE_HEIGHT)
        .collect();

    CoverLayout {
        page,
        snapshot: Rect {
            x: (page.width - width) / 2.0,
            y: top,
            width,
            height,
        },
        logo,
        metadata_baselines,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentLayout {
    pub page: PageSize,
    pub orientation: Orientation,
    pub image: Rect,
    pub caption_x: f64,
    pub caption_baseline: f64,
}

/// Landscape for wide images, portrait otherwise; the image is centred within the margin
pub fn attachment_layout(image_width: u32, image_height: u32) -> AttachmentLayout {
    let orientation = if image_width > 0 && f64::from(image_height) / f64::from(image_width) < 1.0 {
        Orientation::Landscape
    } else {
        Orientation::Portrait
    };
    let page = A4.oriented(orientation);
    let margin = ATTACHMENT_MARGIN;

    let (width, height) = fit_within(
        image_width,
        image_height,
        page.width - margin * 2.0,
        page.height - margin * 2.0,
    );

    AttachmentLayout {
        page,
        orientation,
        image: Rect {
            x: (page.width - width) / 2.0,
            y: (page.height - height) / 2.0,
            width,
            height,
        },
        caption_x: margin,
        caption_baseline: page.height - margin / 2.0,
    }
}
