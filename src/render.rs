use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;

use uuid::Uuid;

use crate::error::{GangsheetError, Result};
use crate::types::{Hundredths, PackingSettings, PlacementResult, Roll};

const MAX_WIDTH: f64 = 80.0;
const MAX_HEIGHT: f64 = 40.0;

/// Everything a renderer needs to produce the print files of one gangsheet.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub gangsheet_id: Uuid,
    pub settings: PackingSettings,
    pub result: PlacementResult,
    /// Design item id -> source image URL.
    pub image_urls: HashMap<String, String>,
}

/// Produces one output file per roll and returns their URLs in roll order.
pub trait Renderer: Send + Sync + 'static {
    fn render(&self, job: RenderJob) -> impl Future<Output = Result<Vec<String>>> + Send;
}

/// Writes each roll as an SVG sized in inches, one `<image>` per placement.
pub struct SvgRenderer {
    output_dir: PathBuf,
    public_base_url: String,
}

impl SvgRenderer {
    pub fn new(output_dir: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Renderer for SvgRenderer {
    async fn render(&self, job: RenderJob) -> Result<Vec<String>> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| GangsheetError::Rendering(format!("{}: {e}", self.output_dir.display())))?;

        let mut urls = Vec::with_capacity(job.result.rolls.len());
        for roll in &job.result.rolls {
            let file_name = format!("{}-roll-{}.svg", job.gangsheet_id, roll.roll_number);
            let path = self.output_dir.join(&file_name);
            let svg = render_svg(roll, &job.settings, &job.image_urls);
            tokio::fs::write(&path, svg)
                .await
                .map_err(|e| GangsheetError::Rendering(format!("{}: {e}", path.display())))?;
            urls.push(format!("{}/{}", self.public_base_url, file_name));
        }
        Ok(urls)
    }
}

fn inches(v: Hundredths) -> String {
    format!("{}.{:02}in", v / 100, v % 100)
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

pub fn render_svg(
    roll: &Roll,
    settings: &PackingSettings,
    image_urls: &HashMap<String, String>,
) -> String {
    let width = settings.roll_width;
    let height = roll.max_height_used + settings.margin_top;
    let mut svg = format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{}\" height=\"{}\" viewBox=\"0 0 {width} {height}\">\n",
        inches(width),
        inches(height),
    );
    for p in &roll.placements {
        let href = image_urls
            .get(&p.design_item_id)
            .map(String::as_str)
            .unwrap_or_default();
        svg.push_str(&format!(
            "  <image id=\"{}\" href=\"{}\" x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" preserveAspectRatio=\"none\"/>\n",
            escape_attr(&p.design_item_id),
            escape_attr(href),
            p.x,
            p.y,
            p.width,
            p.height,
        ));
    }
    svg.push_str("</svg>\n");
    svg
}

/// ASCII preview of a roll, scaled to fit a terminal.
pub fn render_roll(roll_width: Hundredths, roll: &Roll) -> String {
    let length = roll.max_height_used.max(roll_width / 10).max(1);
    let scale = f64::min(MAX_WIDTH / roll_width as f64, MAX_HEIGHT / length as f64);
    let grid_w = (roll_width as f64 * scale).round() as usize;
    let grid_h = (length as f64 * scale).round() as usize;

    if grid_w == 0 || grid_h == 0 {
        return String::new();
    }

    let mut grid = vec![vec![' '; grid_w + 1]; grid_h + 1];

    draw_rect(&mut grid, 0, 0, grid_w, grid_h);

    for p in &roll.placements {
        let sx = (p.x as f64 * scale).round() as usize;
        let sy = (p.y as f64 * scale).round() as usize;
        let sw = (p.width as f64 * scale).round() as usize;
        let sh = (p.height as f64 * scale).round() as usize;

        if sw == 0 || sh == 0 {
            continue;
        }

        draw_rect(&mut grid, sx, sy, sw, sh);

        let label_chars: Vec<char> = p.design_item_id.chars().collect();

        if sw > 2 && sh > 0 {
            let cx = sx + sw / 2;
            let cy = sy + sh / 2;
            let half = label_chars.len() / 2;
            let start_x = cx.saturating_sub(half);

            for (i, &ch) in label_chars.iter().enumerate() {
                let x = start_x + i;
                if x > sx && x < sx + sw && cy > sy && cy < sy + sh {
                    grid[cy][x] = ch;
                }
            }
        }
    }

    let mut result = String::new();
    for row in &grid {
        let line: String = row.iter().collect();
        result.push_str(line.trim_end());
        result.push('\n');
    }
    result
}

fn edge(current: char, crossing: char, own: char) -> char {
    if current == crossing || current == '+' {
        '+'
    } else {
        own
    }
}

fn draw_rect(grid: &mut [Vec<char>], x: usize, y: usize, w: usize, h: usize) {
    let rows = grid.len();
    let cols = if rows > 0 { grid[0].len() } else { return };

    for i in x..=x + w {
        if i >= cols {
            break;
        }
        for row in [y, y + h] {
            if row < rows {
                grid[row][i] = edge(grid[row][i], '|', '-');
            }
        }
    }

    for row in grid.iter_mut().take(y + h + 1).skip(y) {
        for col in [x, x + w] {
            if col < cols {
                row[col] = edge(row[col], '-', '|');
            }
        }
    }

    for cx in [x, x + w] {
        for cy in [y, y + h] {
            if cy < rows && cx < cols {
                grid[cy][cx] = '+';
            }
        }
    }
}
