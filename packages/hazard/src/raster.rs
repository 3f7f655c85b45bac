//! Gridded hazard maps.
//!
//! Reads ESRI ASCII grids and single-band `GeoTIFF`s into a north-up
//! [`RasterGrid`]. Lines are sampled "all touched": every cell the line
//! intersects contributes its value, and the flooded fraction is the
//! line length inside cells with a positive value.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use geo::{Coord, Euclidean, Intersects, Length, Line, LineString, Point, Rect};
use netrisk_network_models::Extent;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;

use crate::HazardError;
use crate::sampler::{HazardSampler, SampleStats};

/// A north-up grid of hazard values.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterGrid {
    left: f64,
    top: f64,
    cell_width: f64,
    cell_height: f64,
    ncols: usize,
    nrows: usize,
    /// Row-major, top row first.
    values: Vec<f64>,
    nodata: Option<f64>,
}

impl RasterGrid {
    /// Builds a grid from its top-left corner, cell size and row-major
    /// values.
    ///
    /// # Errors
    ///
    /// Returns [`HazardError::Raster`] if the cell size is not positive or
    /// the value count does not match the dimensions.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        left: f64,
        top: f64,
        cell_width: f64,
        cell_height: f64,
        ncols: usize,
        nrows: usize,
        values: Vec<f64>,
        nodata: Option<f64>,
    ) -> Result<Self, HazardError> {
        if !(cell_width > 0.0 && cell_height > 0.0) {
            return Err(HazardError::Raster {
                message: format!("cell size must be positive, got {cell_width} x {cell_height}"),
            });
        }
        if ncols == 0 || nrows == 0 || values.len() != ncols * nrows {
            return Err(HazardError::Raster {
                message: format!(
                    "expected {ncols} x {nrows} values, got {}",
                    values.len()
                ),
            });
        }
        Ok(Self {
            left,
            top,
            cell_width,
            cell_height,
            ncols,
            nrows,
            values,
            nodata,
        })
    }

    /// Reads a grid, choosing the format by file extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    pub fn read(path: &Path) -> Result<Self, HazardError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let grid = match ext.as_str() {
            "tif" | "tiff" => Self::read_geotiff(path)?,
            "asc" | "txt" => Self::parse_ascii(&std::fs::read_to_string(path)?)?,
            other => {
                return Err(HazardError::Unsupported {
                    message: format!("raster format {other:?} of {}", path.display()),
                });
            }
        };
        log::info!(
            "Read {} x {} raster from {}",
            grid.ncols,
            grid.nrows,
            path.display()
        );
        Ok(grid)
    }

    /// Parses an ESRI ASCII grid.
    ///
    /// # Errors
    ///
    /// Returns [`HazardError::Raster`] on a malformed header or values.
    pub fn parse_ascii(text: &str) -> Result<Self, HazardError> {
        let malformed = |message: String| HazardError::Raster { message };

        let mut ncols = None;
        let mut nrows = None;
        let mut x = None;
        let mut y = None;
        let mut centered = false;
        let mut cellsize = None;
        let mut nodata = None;
        let mut values = Vec::new();

        for line in text.lines() {
            let mut tokens = line.split_whitespace();
            let Some(first) = tokens.next() else {
                continue;
            };
            if first.starts_with(|c: char| c.is_ascii_alphabetic()) && values.is_empty() {
                let value = tokens
                    .next()
                    .ok_or_else(|| malformed(format!("header {first} has no value")))?;
                let number: f64 = value
                    .parse()
                    .map_err(|_| malformed(format!("header {first} = {value:?}")))?;
                match first.to_ascii_lowercase().as_str() {
                    "ncols" => ncols = Some(number),
                    "nrows" => nrows = Some(number),
                    "xllcorner" => x = Some(number),
                    "yllcorner" => y = Some(number),
                    "xllcenter" => {
                        x = Some(number);
                        centered = true;
                    }
                    "yllcenter" => {
                        y = Some(number);
                        centered = true;
                    }
                    "cellsize" => cellsize = Some(number),
                    "nodata_value" => nodata = Some(number),
                    other => log::debug!("Ignoring ASCII grid header {other}"),
                }
                continue;
            }
            for token in std::iter::once(first).chain(tokens) {
                values.push(
                    token
                        .parse::<f64>()
                        .map_err(|_| malformed(format!("bad cell value {token:?}")))?,
                );
            }
        }

        let missing = |name: &str| malformed(format!("missing header {name}"));
        let ncols = to_count(ncols.ok_or_else(|| missing("ncols"))?)?;
        let nrows = to_count(nrows.ok_or_else(|| missing("nrows"))?)?;
        let cellsize = cellsize.ok_or_else(|| missing("cellsize"))?;
        let mut left = x.ok_or_else(|| missing("xllcorner"))?;
        let mut bottom = y.ok_or_else(|| missing("yllcorner"))?;
        if centered {
            left -= cellsize / 2.0;
            bottom -= cellsize / 2.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let top = (nrows as f64).mul_add(cellsize, bottom);

        Self::new(left, top, cellsize, cellsize, ncols, nrows, values, nodata)
    }

    /// Reads a single-band `GeoTIFF` georeferenced by pixel scale and tie
    /// point tags.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be decoded or lacks
    /// georeferencing.
    pub fn read_geotiff(path: &Path) -> Result<Self, HazardError> {
        let file = BufReader::new(File::open(path)?);
        let mut decoder = Decoder::new(file)?;

        let (width, height) = decoder.dimensions()?;
        let scale = decoder.get_tag_f64_vec(Tag::ModelPixelScaleTag)?;
        let tie = decoder.get_tag_f64_vec(Tag::ModelTiepointTag)?;
        if scale.len() < 2 || tie.len() < 6 {
            return Err(HazardError::Raster {
                message: format!("{} has incomplete georeferencing tags", path.display()),
            });
        }
        let nodata = decoder
            .get_tag_ascii_string(Tag::GdalNodata)
            .ok()
            .and_then(|s| s.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse().ok());

        #[allow(clippy::cast_precision_loss)]
        let values: Vec<f64> = match decoder.read_image()? {
            DecodingResult::U8(data) => data.into_iter().map(f64::from).collect(),
            DecodingResult::U16(data) => data.into_iter().map(f64::from).collect(),
            DecodingResult::U32(data) => data.into_iter().map(f64::from).collect(),
            DecodingResult::U64(data) => data.into_iter().map(|v| v as f64).collect(),
            DecodingResult::I8(data) => data.into_iter().map(f64::from).collect(),
            DecodingResult::I16(data) => data.into_iter().map(f64::from).collect(),
            DecodingResult::I32(data) => data.into_iter().map(f64::from).collect(),
            DecodingResult::I64(data) => data.into_iter().map(|v| v as f64).collect(),
            DecodingResult::F32(data) => data.into_iter().map(f64::from).collect(),
            DecodingResult::F64(data) => data,
        };

        let (cell_width, cell_height) = (scale[0], scale[1]);
        let (i, j, x, y) = (tie[0], tie[1], tie[3], tie[4]);
        let left = i.mul_add(-cell_width, x);
        let top = j.mul_add(cell_height, y);

        Self::new(
            left,
            top,
            cell_width,
            cell_height,
            width as usize,
            height as usize,
            values,
            nodata,
        )
    }

    /// Cell value, `None` for no-data cells.
    #[must_use]
    pub fn value(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.nrows || col >= self.ncols {
            return None;
        }
        let v = self.values[row * self.ncols + col];
        let is_nodata = v.is_nan() || self.nodata.is_some_and(|nd| (v - nd).abs() < f64::EPSILON);
        (!is_nodata).then_some(v)
    }

    #[allow(clippy::cast_precision_loss)]
    fn cell_rect(&self, row: usize, col: usize) -> Rect<f64> {
        let x0 = (col as f64).mul_add(self.cell_width, self.left);
        let y1 = (row as f64).mul_add(-self.cell_height, self.top);
        Rect::new(
            Coord { x: x0, y: y1 - self.cell_height },
            Coord { x: x0 + self.cell_width, y: y1 },
        )
    }

    /// Index range of cells covering `[lo, hi]` along one axis, clamped to
    /// the grid. `None` when the interval misses the grid entirely.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn index_range(lo: f64, hi: f64, count: usize) -> Option<(usize, usize)> {
        let first = lo.floor();
        let last = hi.floor();
        if last < 0.0 || first >= count as f64 {
            return None;
        }
        let clamp = |v: f64| v.clamp(0.0, (count - 1) as f64) as usize;
        Some((clamp(first), clamp(last)))
    }

    fn touched_cells(&self, line: &LineString<f64>) -> BTreeSet<(usize, usize)> {
        let mut cells = BTreeSet::new();
        for segment in line.lines() {
            let (min_x, max_x) = ordered(segment.start.x, segment.end.x);
            let (min_y, max_y) = ordered(segment.start.y, segment.end.y);
            let Some((c0, c1)) = Self::index_range(
                (min_x - self.left) / self.cell_width,
                (max_x - self.left) / self.cell_width,
                self.ncols,
            ) else {
                continue;
            };
            let Some((r0, r1)) = Self::index_range(
                (self.top - max_y) / self.cell_height,
                (self.top - min_y) / self.cell_height,
                self.nrows,
            ) else {
                continue;
            };
            for row in r0..=r1 {
                for col in c0..=c1 {
                    if self.cell_rect(row, col).intersects(&segment) {
                        cells.insert((row, col));
                    }
                }
            }
        }
        cells
    }
}

impl HazardSampler for RasterGrid {
    #[allow(clippy::cast_precision_loss)]
    fn extent(&self) -> Option<Extent> {
        Some(Extent::new(
            self.left,
            (self.nrows as f64).mul_add(-self.cell_height, self.top),
            (self.ncols as f64).mul_add(self.cell_width, self.left),
            self.top,
        ))
    }

    fn sample_line(&self, line: &LineString<f64>) -> SampleStats {
        let total = Euclidean.length(line);
        let mut values = Vec::new();
        let mut wet = 0.0;

        for (row, col) in self.touched_cells(line) {
            let Some(v) = self.value(row, col) else {
                continue;
            };
            values.push(v);
            if v > 0.0 {
                let rect = self.cell_rect(row, col);
                wet += line.lines().map(|s| clipped_length(s, rect)).sum::<f64>();
            }
        }

        let fraction = if total > 0.0 {
            (wet / total).min(1.0)
        } else if values.iter().any(|v| *v > 0.0) {
            1.0
        } else {
            0.0
        };
        SampleStats::from_values(&values, fraction)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn sample_point(&self, point: Point<f64>) -> SampleStats {
        let col = ((point.x() - self.left) / self.cell_width).floor();
        let row = ((self.top - point.y()) / self.cell_height).floor();
        if col < 0.0 || row < 0.0 {
            return SampleStats::default();
        }
        match self.value(row as usize, col as usize) {
            Some(v) => SampleStats::constant(Some(v)),
            None => SampleStats::default(),
        }
    }
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Length of the part of a segment inside a rectangle (Liang-Barsky).
fn clipped_length(segment: Line<f64>, rect: Rect<f64>) -> f64 {
    let (x0, y0) = (segment.start.x, segment.start.y);
    let dx = segment.end.x - x0;
    let dy = segment.end.y - y0;
    let (min, max) = (rect.min(), rect.max());

    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;
    for (p, q) in [
        (-dx, x0 - min.x),
        (dx, max.x - x0),
        (-dy, y0 - min.y),
        (dy, max.y - y0),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return 0.0;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                t0 = t0.max(r);
            } else {
                t1 = t1.min(r);
            }
        }
    }
    if t1 <= t0 {
        return 0.0;
    }
    (t1 - t0) * dx.hypot(dy)
}

fn to_count(value: f64) -> Result<usize, HazardError> {
    if value.fract() != 0.0 || value < 1.0 {
        return Err(HazardError::Raster {
            message: format!("grid dimension must be a positive integer, got {value}"),
        });
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok(value as usize)
}
