// Synthetic plant workbooks for integration tests
use rust_xlsxwriter::{Workbook, Worksheet};

/// A cell written into a fixture sheet.
#[derive(Clone, Copy)]
pub enum Cell<'a> {
    Num(f64),
    Text(&'a str),
    Blank,
}

/// Row index of the header in plant sheets (data starts right below).
pub const HEADER_ROW: u32 = 4;

fn write_row(worksheet: &mut Worksheet, row: u32, cells: &[Cell]) {
    for (col, cell) in cells.iter().enumerate() {
        let col = col as u16;
        match cell {
            Cell::Num(n) => {
                worksheet.write_number(row, col, *n).unwrap();
            }
            Cell::Text(s) => {
                worksheet.write_string(row, col, *s).unwrap();
            }
            Cell::Blank => {}
        }
    }
}

/// Build an xlsx workbook where each sheet gets a title row, a header on
/// `HEADER_ROW`, and `rows` below it.
pub fn workbook_bytes(sheets: &[(&str, &[&str], Vec<Vec<Cell>>)]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    for (name, header, rows) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*name).unwrap();
        worksheet.write_string(0, 0, "Controle de Qualidade").unwrap();

        let header: Vec<Cell> = header.iter().map(|h| Cell::Text(*h)).collect();
        write_row(worksheet, HEADER_ROW, &header);
        for (offset, row) in rows.iter().enumerate() {
            write_row(worksheet, HEADER_ROW + 1 + offset as u32, row);
        }
    }
    workbook.save_to_buffer().unwrap()
}
