//! 图像模板匹配
//!
//! 零均值归一化互相关（NCC），先在缩小图上粗搜，再在原图上于最佳位置附近精搜。

use image::imageops::{self, FilterType};
use image::RgbaImage;

/// 粗搜时模板短边至少保留的像素数
const MIN_COARSE_SIDE: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOptions {
    /// 接受匹配的最低相似度 (0..1)
    pub confidence: f32,
    pub grayscale: bool,
}

/// 匹配结果（截图坐标系内的包围盒）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub score: f32,
}

/// 在 `haystack` 中查找 `needle`，得分低于 `confidence` 时返回 `None`
pub fn find_template(
    haystack: &RgbaImage,
    needle: &RgbaImage,
    options: MatchOptions,
) -> Option<MatchBox> {
    let (nw, nh) = needle.dimensions();
    let (hw, hh) = haystack.dimensions();
    if nw == 0 || nh == 0 || nw > hw || nh > hh {
        return None;
    }

    let scale = coarse_scale(nw.min(nh));
    let (best_x, best_y) = if scale > 1 {
        let small_hay = shrink(haystack, scale);
        let small_needle = shrink(needle, scale);
        let field = Field::new(&small_hay, options.grayscale);
        let template = Templates::new(&small_needle, options.grayscale);
        let (sx, sy, _) = field.search(
            &template,
            0..=field.width - template.width,
            0..=field.height - template.height,
        )?;
        (sx * scale as usize, sy * scale as usize)
    } else {
        (0, 0)
    };

    let field = Field::new(haystack, options.grayscale);
    let template = Templates::new(needle, options.grayscale);
    let max_x = field.width - template.width;
    let max_y = field.height - template.height;
    let (xs, ys) = if scale > 1 {
        let radius = 2 * scale as usize;
        (
            best_x.saturating_sub(radius)..=(best_x + radius).min(max_x),
            best_y.saturating_sub(radius)..=(best_y + radius).min(max_y),
        )
    } else {
        (0..=max_x, 0..=max_y)
    };

    let (x, y, score) = field.search(&template, xs, ys)?;
    let score = score as f32;
    (score >= options.confidence).then_some(MatchBox {
        x: x as u32,
        y: y as u32,
        width: nw,
        height: nh,
        score,
    })
}

fn coarse_scale(short_side: u32) -> u32 {
    [4, 2]
        .into_iter()
        .find(|s| short_side / s >= MIN_COARSE_SIDE)
        .unwrap_or(1)
}

fn shrink(image: &RgbaImage, scale: u32) -> RgbaImage {
    let width = (image.width() / scale).max(1);
    let height = (image.height() / scale).max(1);
    imageops::resize(image, width, height, FilterType::Triangle)
}

fn channels(image: &RgbaImage, grayscale: bool) -> Vec<Vec<f32>> {
    if grayscale {
        vec![image
            .pixels()
            .map(|p| 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32)
            .collect()]
    } else {
        (0..3)
            .map(|c| image.pixels().map(|p| p[c] as f32).collect())
            .collect()
    }
}

/// 模板的各通道（已去均值）
struct Templates {
    width: usize,
    height: usize,
    planes: Vec<(Vec<f32>, f64)>,
}

impl Templates {
    fn new(image: &RgbaImage, grayscale: bool) -> Self {
        let planes = channels(image, grayscale)
            .into_iter()
            .map(|plane| {
                let mean = plane.iter().map(|v| *v as f64).sum::<f64>() / plane.len() as f64;
                let centered: Vec<f32> = plane.iter().map(|v| (*v as f64 - mean) as f32).collect();
                let norm = centered.iter().map(|v| (*v as f64).powi(2)).sum::<f64>().sqrt();
                (centered, norm)
            })
            .collect();
        Self {
            width: image.width() as usize,
            height: image.height() as usize,
            planes,
        }
    }
}

/// 被搜索图像的各通道及其积分图
struct Field {
    width: usize,
    height: usize,
    planes: Vec<(Vec<f32>, Integral)>,
}

impl Field {
    fn new(image: &RgbaImage, grayscale: bool) -> Self {
        let width = image.width() as usize;
        let height = image.height() as usize;
        let planes = channels(image, grayscale)
            .into_iter()
            .map(|plane| {
                let integral = Integral::new(&plane, width, height);
                (plane, integral)
            })
            .collect();
        Self {
            width,
            height,
            planes,
        }
    }

    fn search(
        &self,
        template: &Templates,
        xs: std::ops::RangeInclusive<usize>,
        ys: std::ops::RangeInclusive<usize>,
    ) -> Option<(usize, usize, f64)> {
        let mut best: Option<(usize, usize, f64)> = None;
        for y in ys {
            for x in xs.clone() {
                let score = self.score_at(template, x, y);
                if best.map_or(true, |(_, _, s)| score > s) {
                    best = Some((x, y, score));
                }
            }
        }
        best
    }

    fn score_at(&self, template: &Templates, x: usize, y: usize) -> f64 {
        let n = (template.width * template.height) as f64;
        let mut total = 0.0;
        for ((plane, integral), (centered, t_norm)) in self.planes.iter().zip(&template.planes) {
            let (sum, sq) = integral.window(x, y, template.width, template.height);
            let variance = (sq - sum * sum / n).max(0.0);
            let w_norm = variance.sqrt();

            if *t_norm < 1e-6 || w_norm < 1e-6 {
                // 纯色模板：只有纯色且均值接近的窗口算匹配
                let flat = *t_norm < 1e-6 && w_norm < 1e-6;
                total += if flat { 1.0 } else { 0.0 };
                continue;
            }

            let mut cross = 0.0f64;
            for ty in 0..template.height {
                let row = (y + ty) * self.width + x;
                let t_row = ty * template.width;
                for tx in 0..template.width {
                    cross += plane[row + tx] as f64 * centered[t_row + tx] as f64;
                }
            }
            total += cross / (w_norm * t_norm);
        }
        total / self.planes.len() as f64
    }
}

struct Integral {
    stride: usize,
    sum: Vec<f64>,
    sq: Vec<f64>,
}

impl Integral {
    fn new(plane: &[f32], width: usize, height: usize) -> Self {
        let stride = width + 1;
        let mut sum = vec![0.0; stride * (height + 1)];
        let mut sq = vec![0.0; stride * (height + 1)];
        for y in 0..height {
            let mut row_sum = 0.0;
            let mut row_sq = 0.0;
            for x in 0..width {
                let v = plane[y * width + x] as f64;
                row_sum += v;
                row_sq += v * v;
                sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row_sum;
                sq[(y + 1) * stride + x + 1] = sq[y * stride + x + 1] + row_sq;
            }
        }
        Self { stride, sum, sq }
    }

    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        let at = |table: &Vec<f64>, xx: usize, yy: usize| table[yy * self.stride + xx];
        let rect = |table: &Vec<f64>| {
            at(table, x + w, y + h) - at(table, x, y + h) - at(table, x + w, y) + at(table, x, y)
        };
        (rect(&self.sum), rect(&self.sq))
    }
}
