// cairn is an incremental backup tool
// Copyright (C) 2025  Javier Lancha Vázquez <javier.lancha@gmail.com>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! A minimal fixed-column table renderer for the final backup/restore
//! summary report.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Right,
}

pub struct Table {
    headers: Vec<String>,
    alignment: Vec<Alignment>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&str], alignment: &[Alignment]) -> Self {
        assert_eq!(headers.len(), alignment.len());
        Self {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            alignment: alignment.to_vec(),
            rows: Vec::new(),
        }
    }

    pub fn add_row(&mut self, row: Vec<String>) {
        assert_eq!(row.len(), self.headers.len());
        self.rows.push(row);
    }

    fn column_width(&self, col: usize) -> usize {
        let header_len = self.headers[col].len();
        self.rows
            .iter()
            .map(|r| r[col].len())
            .chain(std::iter::once(header_len))
            .max()
            .unwrap_or(header_len)
    }

    fn render_cell(&self, col: usize, text: &str, width: usize) -> String {
        match self.alignment[col] {
            Alignment::Left => format!("{text:<width$}"),
            Alignment::Right => format!("{text:>width$}"),
        }
    }

    pub fn render(&self) -> String {
        let widths: Vec<usize> = (0..self.headers.len())
            .map(|c| self.column_width(c))
            .collect();

        let mut out = String::new();
        for (i, h) in self.headers.iter().enumerate() {
            out.push_str(&self.render_cell(i, h, widths[i]));
            out.push_str("  ");
        }
        out.push('\n');

        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                out.push_str(&self.render_cell(i, cell, widths[i]));
                out.push_str("  ");
            }
            out.push('\n');
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_aligns_columns() {
        let mut table = Table::new(&["Name", "Count"], &[Alignment::Left, Alignment::Right]);
        table.add_row(vec!["files".to_string(), "10".to_string()]);
        table.add_row(vec!["dirs".to_string(), "2".to_string()]);
        let rendered = table.render();
        assert!(rendered.contains("files"));
        assert!(rendered.contains("Count"));
    }
}
