//! XLSX-specific machinery: the worksheet-walk renderer driver (C12).
//! Package I/O is delegated to `umya-spreadsheet` directly (§4.13), so
//! there is no XLSX counterpart to `pptx::package`.

pub mod renderer;
