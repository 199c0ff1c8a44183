use clap::Parser;
use gangsheet::render;
use gangsheet::solver::Solver;
use gangsheet::types::{DesignItem, FailureReason, Hundredths, PackingSettings, RollLength, Size};

#[derive(Parser)]
#[command(name = "gangsheet", about = "Gangsheet roll packer for print-on-demand artwork")]
struct Cli {
    /// Roll width in inches (e.g. 22 or 22.5)
    #[arg(long, default_value = "22", value_parser = parse_inches)]
    roll_width: Hundredths,

    /// Maximum roll length in inches; unbounded when omitted
    #[arg(long, value_parser = parse_inches)]
    roll_length: Option<Hundredths>,

    /// Print resolution used to convert pixel sizes
    #[arg(long, default_value_t = 300)]
    dpi: u32,

    /// Gap between items in inches
    #[arg(long, default_value = "0", value_parser = parse_inches)]
    gap: Hundredths,

    /// Top and left margin in inches
    #[arg(long, default_value = "0", value_parser = parse_inches)]
    margin: Hundredths,

    /// Designs as WxH[:qty][@group] in pixels (e.g. 3000x3000:3@front)
    #[arg(long = "items", num_args = 1..)]
    items: Vec<String>,

    /// Cluster items that share a group key
    #[arg(long)]
    group_by_modification: bool,

    /// Show ASCII layout of each roll
    #[arg(long)]
    layout: bool,

    /// Print the placement result as JSON
    #[arg(long)]
    json: bool,
}

/// Parses inches with up to two decimals into hundredths without going through floats.
fn parse_inches(s: &str) -> Result<Hundredths, String> {
    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    if frac.len() > 2 || (whole.is_empty() && frac.is_empty()) {
        return Err(format!("invalid length '{}', expected inches like 22 or 22.5", s));
    }
    let whole: u32 = if whole.is_empty() {
        0
    } else {
        whole
            .parse()
            .map_err(|_| format!("invalid length '{}'", s))?
    };
    let frac: u32 = if frac.is_empty() {
        0
    } else {
        let digits: u32 = frac
            .parse()
            .map_err(|_| format!("invalid length '{}'", s))?;
        if frac.len() == 1 { digits * 10 } else { digits }
    };
    whole
        .checked_mul(100)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(|| format!("length '{}' is too large", s))
}

fn parse_dimensions(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once('x')
        .ok_or_else(|| format!("invalid dimensions '{}', expected WxH", s))?;
    let w = w
        .parse::<u32>()
        .map_err(|_| format!("invalid width in '{}'", s))?;
    let h = h
        .parse::<u32>()
        .map_err(|_| format!("invalid height in '{}'", s))?;
    if w == 0 || h == 0 {
        return Err(format!("dimensions must be non-zero in '{}'", s));
    }
    Ok((w, h))
}

/// Expands one `WxH[:qty][@group]` argument into design items of a single order.
fn parse_items(s: &str, order_id: i64) -> Result<Vec<DesignItem>, String> {
    let (rest, group) = match s.split_once('@') {
        Some((rest, group)) if !group.is_empty() => (rest, Some(group.to_string())),
        Some(_) => return Err(format!("empty group in '{}'", s)),
        None => (s, None),
    };
    let (dims, qty) = match rest.split_once(':') {
        Some((dims, qty)) => {
            let qty = qty
                .parse::<u32>()
                .map_err(|_| format!("invalid quantity in '{}'", s))?;
            (dims, qty)
        }
        None => (rest, 1),
    };
    if qty == 0 {
        return Err(format!("quantity must be non-zero in '{}'", s));
    }
    let (width_px, height_px) = parse_dimensions(dims)?;
    Ok((1..=qty)
        .map(|n| DesignItem {
            id: format!("{order_id}-{n}"),
            order_id,
            group_key: group.clone(),
            width_px,
            height_px,
            image_url: String::new(),
        })
        .collect())
}

fn fmt_in(v: Hundredths) -> String {
    format!("{}.{:02}", v / 100, v % 100)
}

fn main() {
    let cli = Cli::parse();

    let settings = PackingSettings {
        roll_width: cli.roll_width,
        roll_length: cli
            .roll_length
            .map(RollLength::Bounded)
            .unwrap_or(RollLength::Unbounded),
        dpi: cli.dpi,
        gap_between_items: cli.gap,
        margin_top: cli.margin,
        margin_left: cli.margin,
    };

    let items: Vec<DesignItem> = cli
        .items
        .iter()
        .enumerate()
        .map(|(i, s)| parse_items(s, i as i64 + 1))
        .collect::<Result<Vec<_>, _>>()
        .map(|groups| groups.into_iter().flatten().collect())
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        });

    let result = Solver::new(settings, cli.group_by_modification)
        .solve(&items)
        .unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        });

    if cli.json {
        match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    for roll in &result.rolls {
        println!(
            "Roll {} ({}in used, {:.1}% utilization):",
            roll.roll_number,
            fmt_in(roll.max_height_used),
            roll.utilization * 100.0
        );
        for p in &roll.placements {
            println!(
                "  {} {} @ ({}, {})",
                p.design_item_id,
                p.size(),
                fmt_in(p.x),
                fmt_in(p.y)
            );
        }
        if cli.layout {
            print!("{}", render::render_roll(settings.roll_width, roll));
        }
        println!();
    }

    for f in &result.failed {
        let why = match f.reason {
            FailureReason::TooWide => "wider than the roll",
            FailureReason::TooLong => "longer than the roll",
        };
        println!(
            "Oversized: {} {} ({})",
            f.design_item_id,
            Size::new(f.width, f.height),
            why
        );
    }

    println!(
        "Summary: {} roll{} used, {} design{} placed, {} oversized, {}in of material",
        result.total_rolls,
        if result.total_rolls == 1 { "" } else { "s" },
        result.total_designs,
        if result.total_designs == 1 { "" } else { "s" },
        result.failed.len(),
        fmt_in(result.total_length_used().min(u32::MAX as u64) as u32),
    );
}
