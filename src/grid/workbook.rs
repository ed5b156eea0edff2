use super::sheet::Worksheet;
use crate::error::{StencilError, StencilResult};

/// In-memory workbook: ordered worksheets plus the active sheet index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    sheets: Vec<Worksheet>,
    active: usize,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    pub fn sheets(&self) -> &[Worksheet] {
        &self.sheets
    }

    pub fn sheets_mut(&mut self) -> &mut [Worksheet] {
        &mut self.sheets
    }

    pub fn sheet(&self, index: usize) -> Option<&Worksheet> {
        self.sheets.get(index)
    }

    pub fn sheet_mut(&mut self, index: usize) -> Option<&mut Worksheet> {
        self.sheets.get_mut(index)
    }

    pub fn sheet_by_name(&self, name: &str) -> Option<&Worksheet> {
        self.sheets.iter().find(|s| s.name() == name)
    }

    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        self.sheets.iter().position(|s| s.name() == name)
    }

    /// Append a sheet and return its index.
    pub fn add_sheet(&mut self, sheet: Worksheet) -> usize {
        self.sheets.push(sheet);
        self.sheets.len() - 1
    }

    pub fn remove_sheet(&mut self, index: usize) -> StencilResult<Worksheet> {
        if index >= self.sheets.len() {
            return Err(StencilError::Workbook(format!(
                "Sheet index {} out of range ({} sheets)",
                index,
                self.sheets.len()
            )));
        }
        let removed = self.sheets.remove(index);
        if self.active >= self.sheets.len() {
            self.active = self.sheets.len().saturating_sub(1);
        } else if self.active > index {
            self.active -= 1;
        }
        Ok(removed)
    }

    /// Full structural copy of a sheet appended at the end under a new name.
    pub fn clone_sheet(&mut self, index: usize, name: impl Into<String>) -> StencilResult<usize> {
        let mut copy = self
            .sheets
            .get(index)
            .cloned()
            .ok_or_else(|| StencilError::Workbook(format!("No sheet at index {}", index)))?;
        copy.set_name(name);
        Ok(self.add_sheet(copy))
    }

    pub fn active_sheet(&self) -> usize {
        self.active
    }

    pub fn set_active_sheet(&mut self, index: usize) {
        if index < self.sheets.len() {
            self.active = index;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellValue;

    #[test]
    fn test_clone_and_remove() {
        let mut wb = Workbook::new();
        let mut sheet = Worksheet::new("Template");
        sheet.set_value(0, 0, CellValue::Text("x".into()));
        wb.add_sheet(sheet);

        let idx = wb.clone_sheet(0, "Copy").unwrap();
        assert_eq!(idx, 1);
        assert_eq!(wb.sheet(1).unwrap().value(0, 0), CellValue::Text("x".into()));

        wb.set_active_sheet(1);
        wb.remove_sheet(0).unwrap();
        assert_eq!(wb.sheet_count(), 1);
        assert_eq!(wb.active_sheet(), 0);
        assert_eq!(wb.sheet(0).unwrap().name(), "Copy");
        assert!(wb.remove_sheet(3).is_err());
    }
}
