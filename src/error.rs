use thiserror::Error;

/// 本库的错误类型
///
/// 配置类错误在扫描开始前返回；逐条记录的渲染路径从不返回错误。
#[derive(Error, Clone, Debug, PartialEq)]
pub enum DensityError {
    /// 缺少必需的扫描选项
    #[error("缺少必需的选项`{0}`")]
    MissingOption(&'static str),

    /// 选项值格式错误
    #[error("选项`{key}`的值`{value}`无效: {reason}")]
    InvalidOption {
        /// 选项键
        key: &'static str,
        /// 原始值
        value: String,
        /// 失败原因
        reason: String,
    },

    /// 包络范围为空或坐标非有限（需要 minX < maxX 且 minY < maxY）
    #[error("包络范围无效: 需要 minX < maxX 且 minY < maxY，且均为有限值")]
    InvalidEnvelope,

    /// 网格分辨率为零
    #[error("网格分辨率无效: 宽度和高度必须大于0")]
    InvalidGrid,

    /// 模式中没有几何属性
    #[error("模式`{0}`没有几何属性")]
    NoGeometry(String),

    /// 权重表达式无法解析或编译
    #[error("权重表达式错误: {0}")]
    Expression(String),

    /// 表达式引用了模式中不存在的属性
    #[error("未知属性`{0}`")]
    UnknownAttribute(String),

    /// 编码数据被截断或损坏
    #[error("编码数据格式错误: {0}")]
    Malformed(String),

    /// 载体要素上没有密度负载
    #[error("要素不携带密度结果负载")]
    MissingPayload,
}

/// 本库使用的结果类型，使用[DensityError]作为错误类型。
pub type Result<T> = std::result::Result<T, DensityError>;
