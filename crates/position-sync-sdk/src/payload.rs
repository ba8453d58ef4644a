//! 位置数据载荷
//!
//! 线上格式为扁平 JSON 对象：`{"posX":1.5,"posY":0.0,"posZ":-2.25}`

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// 三维位置（由实体层提供/消费）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    /// 原点，位置源不可用时的兜底值
    pub const ZERO: Position = Position { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl From<(f32, f32, f32)> for Position {
    fn from((x, y, z): (f32, f32, f32)) -> Self {
        Self { x, y, z }
    }
}

impl From<[f32; 3]> for Position {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

/// 位置载荷（不可变值对象，每个请求新建）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionPayload {
    #[serde(rename = "posX")]
    pos_x: f32,
    #[serde(rename = "posY")]
    pos_y: f32,
    #[serde(rename = "posZ")]
    pos_z: f32,
}

impl PositionPayload {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            pos_x: x,
            pos_y: y,
            pos_z: z,
        }
    }

    pub fn x(&self) -> f32 {
        self.pos_x
    }

    pub fn y(&self) -> f32 {
        self.pos_y
    }

    pub fn z(&self) -> f32 {
        self.pos_z
    }

    pub fn position(&self) -> Position {
        Position::new(self.pos_x, self.pos_y, self.pos_z)
    }

    /// 序列化为 JSON 字符串
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// 从 JSON 字符串解析
    ///
    /// 缺失字段、类型不匹配或格式错误都返回 `PositionSyncError::Parse`
    pub fn from_json(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }
}

impl From<Position> for PositionPayload {
    fn from(position: Position) -> Self {
        Self::new(position.x, position.y, position.z)
    }
}

impl From<PositionPayload> for Position {
    fn from(payload: PositionPayload) -> Self {
        payload.position()
    }
}
