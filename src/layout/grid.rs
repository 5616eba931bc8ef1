use crate::ir::NodeId;

use super::LayoutError;

/// Occupancy of a single grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellState {
    #[default]
    Free,
    /// Held back next to a high fan-out node; only single-edge nodes may take it.
    Reserved,
    /// Vacated by a displaced node and no longer available for placement.
    Engaged,
    Node(NodeId),
}

/// Raw cell encoding: one `u32` per cell, with node ids offset past the
/// three plain states.
const NODE_BASE: u32 = 3;

impl CellState {
    fn pack(self) -> Option<u32> {
        match self {
            CellState::Free => Some(0),
            CellState::Reserved => Some(1),
            CellState::Engaged => Some(2),
            CellState::Node(id) => u32::try_from(id.0).ok()?.checked_add(NODE_BASE),
        }
    }

    fn unpack(raw: u32) -> Self {
        match raw {
            0 => CellState::Free,
            1 => CellState::Reserved,
            2 => CellState::Engaged,
            id => CellState::Node(NodeId((id - NODE_BASE) as usize)),
        }
    }

    pub fn is_node(self) -> bool {
        matches!(self, CellState::Node(_))
    }

    /// Free or reserved, i.e. an edge may pass through.
    pub fn is_passable(self) -> bool {
        matches!(self, CellState::Free | CellState::Reserved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Column,
    Row,
}

/// Logical grid coordinate, relative to the grid origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Fixed-size allocation table used during a single layout pass.
///
/// Coordinates are logical: the cell at `(0, 0)` is the origin, and negative
/// coordinates address cells west/north of it. The grid never grows; reads
/// outside it return `None` and writes fail with [`LayoutError::GridExhausted`].
#[derive(Debug, Clone)]
pub struct OccupancyGrid {
    dim_x: usize,
    dim_y: usize,
    origin_x: i32,
    origin_y: i32,
    cells: Vec<u32>,
    used_columns: Vec<bool>,
    used_rows: Vec<bool>,
    column_channels: Vec<i32>,
    row_channels: Vec<i32>,
}

impl OccupancyGrid {
    /// Grid with the origin in the centre.
    pub fn new(dim_x: usize, dim_y: usize) -> Self {
        Self::with_origin(dim_x, dim_y, (dim_x / 2) as i32, (dim_y / 2) as i32)
    }

    /// Grid whose logical `(0, 0)` sits at storage index `(origin_x, origin_y)`.
    pub fn with_origin(dim_x: usize, dim_y: usize, origin_x: i32, origin_y: i32) -> Self {
        let dim_x = dim_x.max(1);
        let dim_y = dim_y.max(1);
        Self {
            dim_x,
            dim_y,
            origin_x,
            origin_y,
            cells: vec![0; dim_x * dim_y],
            used_columns: vec![false; dim_x],
            used_rows: vec![false; dim_y],
            column_channels: vec![0; dim_x],
            row_channels: vec![0; dim_y],
        }
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.dim_x, self.dim_y)
    }

    fn column_index(&self, x: i32) -> Option<usize> {
        let idx = x.checked_add(self.origin_x)?;
        (idx >= 0 && (idx as usize) < self.dim_x).then_some(idx as usize)
    }

    fn row_index(&self, y: i32) -> Option<usize> {
        let idx = y.checked_add(self.origin_y)?;
        (idx >= 0 && (idx as usize) < self.dim_y).then_some(idx as usize)
    }

    fn index(&self, pos: GridPos) -> Option<usize> {
        let col = self.column_index(pos.x)?;
        let row = self.row_index(pos.y)?;
        Some(row * self.dim_x + col)
    }

    pub fn contains(&self, pos: GridPos) -> bool {
        self.index(pos).is_some()
    }

    pub fn contains_column(&self, x: i32) -> bool {
        self.column_index(x).is_some()
    }

    pub fn contains_row(&self, y: i32) -> bool {
        self.row_index(y).is_some()
    }

    pub fn exhausted(&self, pos: GridPos) -> LayoutError {
        LayoutError::GridExhausted {
            x: pos.x,
            y: pos.y,
            dim_x: self.dim_x,
            dim_y: self.dim_y,
        }
    }

    pub fn cell(&self, pos: GridPos) -> Option<CellState> {
        self.index(pos).map(|idx| CellState::unpack(self.cells[idx]))
    }

    /// Fails when `pos` lies outside the grid or the node id does not fit
    /// the cell encoding.
    pub fn set_cell(&mut self, pos: GridPos, state: CellState) -> Result<(), LayoutError> {
        let idx = self.index(pos).ok_or_else(|| self.exhausted(pos))?;
        self.cells[idx] = state.pack().ok_or_else(|| self.exhausted(pos))?;
        Ok(())
    }

    pub fn mark_column_used(&mut self, x: i32) -> Result<(), LayoutError> {
        let idx = self
            .column_index(x)
            .ok_or_else(|| self.exhausted(GridPos::new(x, 0)))?;
        self.used_columns[idx] = true;
        Ok(())
    }

    pub fn mark_row_used(&mut self, y: i32) -> Result<(), LayoutError> {
        let idx = self
            .row_index(y)
            .ok_or_else(|| self.exhausted(GridPos::new(0, y)))?;
        self.used_rows[idx] = true;
        Ok(())
    }

    pub fn column_used(&self, x: i32) -> bool {
        self.column_index(x).is_some_and(|idx| self.used_columns[idx])
    }

    pub fn row_used(&self, y: i32) -> bool {
        self.row_index(y).is_some_and(|idx| self.used_rows[idx])
    }

    pub fn first_used_column(&self) -> Option<i32> {
        self.used_columns
            .iter()
            .position(|used| *used)
            .map(|idx| idx as i32 - self.origin_x)
    }

    pub fn last_used_column(&self) -> Option<i32> {
        self.used_columns
            .iter()
            .rposition(|used| *used)
            .map(|idx| idx as i32 - self.origin_x)
    }

    pub fn first_used_row(&self) -> Option<i32> {
        self.used_rows
            .iter()
            .position(|used| *used)
            .map(|idx| idx as i32 - self.origin_y)
    }

    pub fn last_used_row(&self) -> Option<i32> {
        self.used_rows
            .iter()
            .rposition(|used| *used)
            .map(|idx| idx as i32 - self.origin_y)
    }

    pub fn used_column_count(&self) -> usize {
        self.used_columns.iter().filter(|used| **used).count()
    }

    pub fn used_row_count(&self) -> usize {
        self.used_rows.iter().filter(|used| **used).count()
    }

    /// Returns the channel's current offset and advances it along
    /// `0, +1, -1, +2, -2, ...`.
    pub fn edge_channel_offset(&mut self, axis: Axis, index: i32) -> Result<i32, LayoutError> {
        let (slot, pos) = match axis {
            Axis::Column => (self.column_index(index), GridPos::new(index, 0)),
            Axis::Row => (self.row_index(index), GridPos::new(0, index)),
        };
        let slot = slot.ok_or_else(|| self.exhausted(pos))?;
        let counter = match axis {
            Axis::Column => &mut self.column_channels[slot],
            Axis::Row => &mut self.row_channels[slot],
        };
        let current = *counter;
        *counter = next_channel(current);
        Ok(current)
    }

    /// Every node-occupied cell, row-major.
    pub fn node_cells(&self) -> impl Iterator<Item = (GridPos, NodeId)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(idx, raw)| match CellState::unpack(*raw) {
                CellState::Node(id) => Some((
                    GridPos::new(
                        (idx % self.dim_x) as i32 - self.origin_x,
                        (idx / self.dim_x) as i32 - self.origin_y,
                    ),
                    id,
                )),
                _ => None,
            })
    }
}

/// Successor of `current` in the channel sequence `0, +1, -1, +2, -2, ...`.
pub(super) fn next_channel(current: i32) -> i32 {
    if current > 0 { -current } else { -current + 1 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridSizing;

    #[test]
    fn centred_origin_allows_negative_coordinates() {
        let grid = OccupancyGrid::new(10, 10);
        assert_eq!(grid.cell(GridPos::new(-5, -5)), Some(CellState::Free));
        assert_eq!(grid.cell(GridPos::new(4, 4)), Some(CellState::Free));
        assert_eq!(grid.cell(GridPos::new(5, 0)), None);
        assert_eq!(grid.cell(GridPos::new(0, -6)), None);
    }

    #[test]
    fn writes_outside_fail_with_exhaustion() {
        let mut grid = OccupancyGrid::new(10, 10);
        let err = grid
            .set_cell(GridPos::new(12, 0), CellState::Reserved)
            .unwrap_err();
        assert_eq!(
            err,
            LayoutError::GridExhausted {
                x: 12,
                y: 0,
                dim_x: 10,
                dim_y: 10
            }
        );
        assert!(grid.mark_row_used(-9).is_err());
    }

    #[test]
    fn sizing_uses_floor_and_factors() {
        let sizing = GridSizing {
            factor_x: 5,
            factor_y: 3,
            min_dim: 10,
        };
        assert_eq!(sizing.dims(1), (10, 10));
        assert_eq!(sizing.dims(4), (20, 12));
    }

    #[test]
    fn used_lines_report_extremes() {
        let mut grid = OccupancyGrid::new(10, 10);
        assert_eq!(grid.first_used_row(), None);
        grid.mark_row_used(2).unwrap();
        grid.mark_row_used(-3).unwrap();
        grid.mark_column_used(1).unwrap();
        assert_eq!(grid.first_used_row(), Some(-3));
        assert_eq!(grid.last_used_row(), Some(2));
        assert_eq!(grid.first_used_column(), Some(1));
        assert_eq!(grid.last_used_column(), Some(1));
        assert!(grid.row_used(2));
        assert!(!grid.row_used(0));
        assert_eq!(grid.used_row_count(), 2);
    }

    #[test]
    fn channel_offsets_alternate_symmetrically() {
        let mut grid = OccupancyGrid::new(10, 10);
        let offsets: Vec<i32> = (0..5)
            .map(|_| grid.edge_channel_offset(Axis::Row, 1).unwrap())
            .collect();
        assert_eq!(offsets, vec![0, 1, -1, 2, -2]);
        // Other channels are independent.
        assert_eq!(grid.edge_channel_offset(Axis::Column, 1).unwrap(), 0);
    }

    #[test]
    fn node_cells_lists_occupants() {
        let mut grid = OccupancyGrid::with_origin(4, 4, 0, 2);
        grid.set_cell(GridPos::new(1, -1), CellState::Node(NodeId(3)))
            .unwrap();
        grid.set_cell(GridPos::new(0, 0), CellState::Reserved).unwrap();
        let cells: Vec<_> = grid.node_cells().collect();
        assert_eq!(cells, vec![(GridPos::new(1, -1), NodeId(3))]);
    }

    #[test]
    fn every_state_reads_back_as_written() {
        let mut grid = OccupancyGrid::new(4, 1);
        let states = [
            CellState::Reserved,
            CellState::Engaged,
            CellState::Node(NodeId(0)),
            CellState::Node(NodeId(70_000)),
        ];
        for (x, state) in (-2..2).zip(states) {
            grid.set_cell(GridPos::new(x, 0), state).unwrap();
        }
        for (x, state) in (-2..2).zip(states) {
            assert_eq!(grid.cell(GridPos::new(x, 0)), Some(state));
        }
        assert!(grid
            .set_cell(GridPos::new(0, 0), CellState::Node(NodeId(usize::MAX)))
            .is_err());
    }
}
