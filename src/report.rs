use crate::aggregation::{ColumnSummary, Frequency};
use crate::dashboard::{DataView, EdaView, MapsView, PlotsView, View};
use std::io::{self, Write};

/// Plain-text rendering of a view for the terminal.
pub fn write_text(view: &View, out: &mut impl Write) -> io::Result<()> {
    match view {
        View::Intro(intro) => {
            writeln!(out, "{}", intro.title)?;
            writeln!(out)?;
            writeln!(out, "{}", intro.description)
        }
        View::Data(data) => write_data(data, out),
        View::Eda(eda) => write_eda(eda, out),
        View::Plots(plots) => write_plots(plots, out),
        View::Maps(maps) => write_maps(maps, out),
        View::Empty { message } => writeln!(out, "{}", message),
    }
}

fn write_data(view: &DataView, out: &mut impl Write) -> io::Result<()> {
    writeln!(
        out,
        "{:>4}  {:>6}  {:<28} {:<10} {:<4} {:>3}  {:<10}  {}",
        "rank", "mark", "competitor", "dob", "nat", "age", "date", "venue"
    )?;
    for r in &view.records {
        writeln!(
            out,
            "{:>4}  {:>6.2}  {:<28} {:<10} {:<4} {:>3}  {:<10}  {}",
            opt(r.rank),
            r.mark,
            r.competitor,
            opt(r.date_of_birth),
            r.nationality_code,
            opt(r.age),
            r.competition_date.to_string(),
            r.venue
        )?;
    }
    writeln!(out)?;
    for doc in view.columns {
        writeln!(out, "- {}: {}", doc.column, doc.description)?;
    }
    Ok(())
}

fn write_eda(view: &EdaView, out: &mut impl Write) -> io::Result<()> {
    writeln!(
        out,
        "{:<6} {:>5} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8} {:>8}",
        "", "count", "mean", "std", "min", "25%", "50%", "75%", "max"
    )?;
    for s in &view.summary {
        write_summary(s, out)?;
    }

    writeln!(out, "\nMissing values")?;
    for m in &view.missing {
        writeln!(out, "  {:<14} {}", m.column, m.missing)?;
    }

    writeln!(out, "\nMarks per country")?;
    write_frequencies(&view.countries, out)?;

    for (place, leader) in ["First", "Second", "Third"].iter().zip(&view.leaders) {
        writeln!(
            out,
            "- {} country with the fastest sprinters: {} ({} marks)",
            place, leader.label, leader.count
        )?;
    }
    Ok(())
}

fn write_summary(s: &ColumnSummary, out: &mut impl Write) -> io::Result<()> {
    writeln!(
        out,
        "{:<6} {:>5} {:>8.3} {:>8.3} {:>8.3} {:>8.3} {:>8.3} {:>8.3} {:>8.3}",
        s.column.as_str(), s.count, s.mean, s.std, s.min, s.q1, s.median, s.q3, s.max
    )
}

fn write_plots(view: &PlotsView, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "100m world record progression")?;
    for e in &view.progression {
        writeln!(
            out,
            "  {}  {:>6.2}  {} ({})",
            e.date, e.mark, e.competitor, e.country_name
        )?;
    }

    writeln!(out, "\nRanking")?;
    for p in &view.ranking {
        writeln!(
            out,
            "  {:>4}  {:>6.2}  {} ({})",
            opt(p.rank),
            p.mark,
            p.competitor,
            p.country_name
        )?;
    }

    writeln!(out, "\nAverage age per country")?;
    for g in &view.average_age {
        writeln!(out, "  {:<24} {:>6.2}", g.group, g.mean)?;
    }

    writeln!(out, "\nVenues")?;
    write_frequencies(&view.venues, out)?;
    if let Some(venue) = &view.busiest_venue {
        writeln!(out, "Most of the fastest marks were run at {}.", venue)?;
    }
    Ok(())
}

fn write_maps(view: &MapsView, out: &mut impl Write) -> io::Result<()> {
    for layer in &view.layers {
        writeln!(out, "Marks by {}", layer.layer)?;
        match layer.domain {
            Some((min, max)) => writeln!(out, "  colour domain {}..={}", min, max)?,
            None => writeln!(out, "  no counts")?,
        }
        writeln!(
            out,
            "  {} of {} boundaries matched",
            layer.matched_features, layer.total_features
        )?;
        if layer.unrecognized > 0 {
            writeln!(out, "  {} marks at venues without a country code", layer.unrecognized)?;
        }
        write_frequencies(&layer.leaders, out)?;
    }
    Ok(())
}

fn write_frequencies(frequencies: &[Frequency], out: &mut impl Write) -> io::Result<()> {
    for f in frequencies {
        writeln!(out, "  {:<32} {:>4}", f.label, f.count)?;
    }
    Ok(())
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
