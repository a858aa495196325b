//! 三维形状特征.
//!
//! 网格特征 (体积, 表面积, 直径) 基于补零后二值标注在 0.5 处的等值面.
//! 等值面以 marching cubes 提取, 顶点取在边的中点. 主成分特征基于区域内体素中心的物理坐标.

use std::collections::BTreeSet;

use nalgebra::{Matrix3, Vector3};
use ndarray::Array3;

use super::cube_table::{CORNERS, EDGES, TRIANGLES};
use super::roi::Roi;
use super::NamedFeatures;
use crate::consts::radiomics::EIGEN_NEGATIVE_TOLERANCE;
use crate::error::ExtractionError;

/// 以 2 倍整数坐标 `(z, y, x)` 表示的网格顶点 (即边两端格点坐标之和).
type Key = (i64, i64, i64);

pub(crate) fn compute(roi: &Roi) -> Result<NamedFeatures, ExtractionError> {
    let voxels = roi.voxel_count();
    if voxels < 2 {
        return Err(ExtractionError::DegenerateShape(roi.region));
    }
    let [sz, sy, sx] = roi.spacing;
    let voxel_volume = voxels as f64 * sz * sy * sx;

    let mesh = SurfaceMesh::from_mask(&roi.mask);
    let scale = [sz / 2.0, sy / 2.0, sx / 2.0];
    let (mesh_volume, surface_area) = mesh.volume_and_area(scale);
    let diameters = mesh.diameters(scale);

    let [least, minor, major] =
        principal_moments(roi).ok_or(ExtractionError::DegenerateShape(roi.region))?;
    if !(major > 0.0) {
        return Err(ExtractionError::DegenerateShape(roi.region));
    }

    Ok(vec![
        ("Elongation", (minor / major).sqrt()),
        ("Flatness", (least / major).sqrt()),
        ("LeastAxisLength", 4.0 * least.sqrt()),
        ("MajorAxisLength", 4.0 * major.sqrt()),
        ("Maximum2DDiameterColumn", diameters.column),
        ("Maximum2DDiameterRow", diameters.row),
        ("Maximum2DDiameterSlice", diameters.slice),
        ("Maximum3DDiameter", diameters.volume),
        ("MeshVolume", mesh_volume),
        ("MinorAxisLength", 4.0 * minor.sqrt()),
        (
            "Sphericity",
            (36.0 * std::f64::consts::PI * mesh_volume * mesh_volume).cbrt() / surface_area,
        ),
        ("SurfaceArea", surface_area),
        ("SurfaceVolumeRatio", surface_area / mesh_volume),
        ("VoxelVolume", voxel_volume),
    ])
}

/// 体素物理坐标协方差矩阵的升序特征值. 负值超出容差时返回 `None`.
fn principal_moments(roi: &Roi) -> Option<[f64; 3]> {
    let [sz, sy, sx] = roi.spacing;
    let points: Vec<Vector3<f64>> = roi
        .voxels()
        .map(|((z, y, x), _)| Vector3::new(z as f64 * sz, y as f64 * sy, x as f64 * sx))
        .collect();
    let n = points.len() as f64;
    let mean = points.iter().sum::<Vector3<f64>>() / n;
    let cov = points
        .iter()
        .map(|p| (p - mean) * (p - mean).transpose())
        .sum::<Matrix3<f64>>()
        / (n - 1.0);

    let mut eigen: [f64; 3] = cov.symmetric_eigenvalues().into();
    eigen.sort_unstable_by(f64::total_cmp);
    for v in eigen.iter_mut() {
        if *v < 0.0 {
            if *v < -EIGEN_NEGATIVE_TOLERANCE {
                return None;
            }
            *v = 0.0;
        }
    }
    Some(eigen)
}

/// 最大直径, 单位毫米.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Diameters {
    /// 任意两个顶点.
    volume: f64,
    /// 同一水平面 (z 相同).
    slice: f64,
    /// 同一冠状面 (y 相同).
    column: f64,
    /// 同一矢状面 (x 相同).
    row: f64,
}

/// 朝外定向的三角网格.
#[derive(Debug, Clone, Default)]
struct SurfaceMesh {
    triangles: Vec<[Key; 3]>,
}

impl SurfaceMesh {
    fn from_mask(mask: &Array3<bool>) -> Self {
        let (nz, ny, nx) = mask.dim();
        // 补零后的网格中, 索引 p 对应原索引 p - 1.
        let inside = |z: usize, y: usize, x: usize| {
            (1..=nz).contains(&z)
                && (1..=ny).contains(&y)
                && (1..=nx).contains(&x)
                && mask[(z - 1, y - 1, x - 1)]
        };

        let mut mesh = Self::default();
        for z in 0..=nz {
            for y in 0..=ny {
                for x in 0..=nx {
                    let mut case = CORNERS
                        .iter()
                        .enumerate()
                        .filter(|(_, [dz, dy, dx])| inside(z + dz, y + dy, x + dx))
                        .fold(0usize, |case, (c, _)| case | 1 << c);
                    // 角点 7 在区域内时取补查表, 三角形反向.
                    let flipped = case & 0x80 != 0;
                    if flipped {
                        case ^= 0xff;
                    }
                    for edges in TRIANGLES[case].chunks_exact(3) {
                        let [a, b, c] = [edges[0], edges[1], edges[2]]
                            .map(|e| edge_vertex((z, y, x), e as usize));
                        match flipped {
                            true => mesh.triangles.push([a, c, b]),
                            false => mesh.triangles.push([a, b, c]),
                        }
                    }
                }
            }
        }
        mesh
    }

    /// 网格包围的体积与表面积. `scale` 为 2 倍坐标到物理坐标的缩放.
    fn volume_and_area(&self, scale: [f64; 3]) -> (f64, f64) {
        let (volume, area) = self.triangles.iter().fold((0.0, 0.0), |(v, a), t| {
            let [p0, p1, p2] = (*t).map(|k| to_physical(k, scale));
            (
                v + p0.dot(&p1.cross(&p2)) / 6.0,
                a + (p1 - p0).cross(&(p2 - p0)).norm() / 2.0,
            )
        });
        (volume.abs(), area)
    }

    fn diameters(&self, scale: [f64; 3]) -> Diameters {
        let vertices: Vec<Key> = self
            .triangles
            .iter()
            .flatten()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let points: Vec<Vector3<f64>> = vertices.iter().map(|k| to_physical(*k, scale)).collect();

        let mut d = Diameters {
            volume: 0.0,
            slice: 0.0,
            column: 0.0,
            row: 0.0,
        };
        for (i, (a, pa)) in vertices.iter().zip(&points).enumerate() {
            for (b, pb) in vertices[i + 1..].iter().zip(&points[i + 1..]) {
                let dist = (pa - pb).norm_squared();
                d.volume = d.volume.max(dist);
                if a.0 == b.0 {
                    d.slice = d.slice.max(dist);
                }
                if a.1 == b.1 {
                    d.column = d.column.max(dist);
                }
                if a.2 == b.2 {
                    d.row = d.row.max(dist);
                }
            }
        }
        Diameters {
            volume: d.volume.sqrt(),
            slice: d.slice.sqrt(),
            column: d.column.sqrt(),
            row: d.row.sqrt(),
        }
    }
}

/// 以 `(z, y, x)` 为原点的立方体第 `edge` 条边的中点.
#[inline]
fn edge_vertex((z, y, x): (usize, usize, usize), edge: usize) -> Key {
    let [p, q] = EDGES[edge].map(|c| CORNERS[c]);
    let coord = |base: usize, axis: usize| (2 * base + p[axis] + q[axis]) as i64;
    (coord(z, 0), coord(y, 1), coord(x, 2))
}

#[inline]
fn to_physical((z, y, x): Key, [sz, sy, sx]: [f64; 3]) -> Vector3<f64> {
    Vector3::new(z as f64 * sz, y as f64 * sy, x as f64 * sx)
}
