// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tesseract TSV parsing. Columns:
// level page block par line word left top width height conf text

use std::collections::HashMap;

use scanlayer_core::{BoundingBox, TextSpan};

const LINE_LEVEL: u32 = 4;
const WORD_LEVEL: u32 = 5;

type LineKey = (u32, u32, u32, u32);

struct Row<'a> {
    level: u32,
    key: LineKey,
    bbox: BoundingBox,
    conf: f64,
    text: &'a str,
}

fn parse_row(row: &str) -> Option<Row<'_>> {
    let cols: Vec<&str> = row.split('\t').collect();
    if cols.len() < 12 {
        return None;
    }
    let int = |i: usize| cols[i].trim().parse::<u32>().ok();
    let float = |i: usize| cols[i].trim().parse::<f64>().ok();
    Some(Row {
        level: int(0)?,
        key: (int(1)?, int(2)?, int(3)?, int(4)?),
        bbox: BoundingBox::new(float(6)?, float(7)?, float(8)?, float(9)?),
        conf: float(10).unwrap_or(-1.0),
        text: cols[11].trim(),
    })
}

/// Parse word rows into spans in image pixel space.
///
/// A word's font size is the height of its text line, which is steadier than
/// the word's own box (ascenders, descenders). Rows with negative confidence
/// or no text are layout-only and skipped.
pub fn parse_tsv(tsv: &str) -> Vec<TextSpan> {
    let rows: Vec<Row<'_>> = tsv.lines().filter_map(parse_row).collect();

    let line_heights: HashMap<LineKey, f64> = rows
        .iter()
        .filter(|row| row.level == LINE_LEVEL)
        .map(|row| (row.key, row.bbox.height))
        .collect();

    rows.iter()
        .filter(|row| row.level == WORD_LEVEL && row.conf >= 0.0 && !row.text.is_empty())
        .map(|row| {
            let font_size = line_heights
                .get(&row.key)
                .copied()
                .filter(|height| *height > 0.0)
                .unwrap_or(row.bbox.height);
            TextSpan::new(row.text, row.bbox, font_size)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t2480\t3508\t-1\t
2\t1\t1\t0\t0\t0\t200\t300\t900\t60\t-1\t
3\t1\t1\t1\t0\t0\t200\t300\t900\t60\t-1\t
4\t1\t1\t1\t1\t0\t200\t300\t900\t60\t-1\t
5\t1\t1\t1\t1\t1\t200\t305\t400\t50\t96.5\tRechnung
5\t1\t1\t1\t1\t2\t640\t300\t460\t58\t91.0\tNr. 2024-17
5\t1\t1\t1\t1\t3\t1120\t300\t10\t10\t-1\t
5\t1\t1\t1\t1\t4\t1150\t300\t20\t60\t88\t
";

    #[test]
    fn extracts_word_rows() {
        let spans = parse_tsv(SAMPLE);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].text, "Rechnung");
        assert_eq!(spans[0].bbox, BoundingBox::new(200.0, 305.0, 400.0, 50.0));
        assert_eq!(spans[1].text, "Nr. 2024-17");
    }

    #[test]
    fn font_size_comes_from_the_line() {
        let spans = parse_tsv(SAMPLE);
        assert!(spans.iter().all(|span| span.font_size == 60.0));
    }

    #[test]
    fn word_height_used_without_line_row() {
        let tsv = "5\t1\t1\t1\t1\t1\t0\t0\t40\t22\t90\tlonely\n";
        let spans = parse_tsv(tsv);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].font_size, 22.0);
    }

    #[test]
    fn malformed_rows_are_ignored() {
        assert!(parse_tsv("garbage\nmore\tgarbage\n").is_empty());
        assert!(parse_tsv("").is_empty());
    }
}
