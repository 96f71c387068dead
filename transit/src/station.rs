//! # 车站记录与线路投影

use crate::table::Transform;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kafka Connect 输出的原始车站记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    /// 站台 Id
    pub stop_id: i32,
    /// 行车方向
    pub direction_id: String,
    /// 站台名称
    pub stop_name: String,
    /// 车站名称
    pub station_name: String,
    /// 车站完整名称
    pub station_descriptive_name: String,
    /// 车站 Id
    pub station_id: i32,
    /// 线路上的站序
    pub order: i32,
    /// 是否停靠红线
    pub red: bool,
    /// 是否停靠蓝线
    pub blue: bool,
    /// 是否停靠绿线
    pub green: bool,
}

/// 线路颜色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Line {
    /// 红线
    Red,
    /// 蓝线
    Blue,
    /// 绿线
    Green,
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Line::Red => write!(f, "red"),
            Line::Blue => write!(f, "blue"),
            Line::Green => write!(f, "green"),
        }
    }
}

/// 物化表中的车站记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformedStation {
    /// 车站 Id
    pub station_id: i32,
    /// 车站名称
    pub station_name: String,
    /// 线路上的站序
    pub order: i32,
    /// 所属线路，三色均未停靠时为空
    pub line: Option<Line>,
}

/// 闸机通行事件，与查询引擎中 `turnstile` 表的列一致
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turnstile {
    /// 车站 Id
    pub station_id: i32,
    /// 车站名称
    pub station_name: String,
    /// 线路
    pub line: Line,
}

/// 按 red、blue、green 顺序取第一个为真的颜色
pub fn calc_line(station: &Station) -> Option<Line> {
    [
        (station.red, Line::Red),
        (station.blue, Line::Blue),
        (station.green, Line::Green),
    ]
    .into_iter()
    .find_map(|(flag, line)| flag.then_some(line))
}

/// 车站投影
#[derive(Debug, Clone, Copy, Default)]
pub struct StationTransform;

impl Transform for StationTransform {
    type Input = Station;
    type Key = i32;
    type Output = TransformedStation;

    fn key(input: &Station) -> i32 {
        input.station_id
    }

    fn apply(input: Station) -> TransformedStation {
        let line = calc_line(&input);
        TransformedStation {
            station_id: input.station_id,
            station_name: input.station_name,
            order: input.order,
            line,
        }
    }
}
