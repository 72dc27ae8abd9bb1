//! 解析路径
//!
//! 只用于诊断：在解析失败时渲染形如
//! `A -> B(参数 2) -> C` 的可读路径。每次扩展都返回新的路径节点，
//! 已有路径从不被原地修改。

use crate::metadata::TypeInfo;
use crate::token::InjectionToken;
use std::fmt;
use std::sync::Arc;

/// 解析路径中的一步
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveStep {
    /// 解析令牌
    Token(InjectionToken),
    /// 构造器参数注入
    Parameter {
        /// 所属构造器
        constructor: TypeInfo,
        /// 参数位置
        index: usize,
        /// 注入令牌
        token: Option<InjectionToken>,
    },
    /// 属性注入
    Property {
        /// 所属构造器
        constructor: TypeInfo,
        /// 属性名称
        key: String,
        /// 注入令牌
        token: Option<InjectionToken>,
    },
}

impl fmt::Display for ResolveStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(token) => write!(f, "{token}"),
            Self::Parameter { constructor, index, token } => {
                write!(f, "{constructor}(参数 {index}: {})", crate::token::token_name(token.as_ref()))
            }
            Self::Property { constructor, key, token } => {
                write!(f, "{constructor}.{key}: {}", crate::token::token_name(token.as_ref()))
            }
        }
    }
}

#[derive(Debug)]
struct ChainNode {
    step: ResolveStep,
    parent: Option<Arc<ChainNode>>,
    len: usize,
}

impl Drop for ChainNode {
    // 深度可达数千，逐个释放父节点以避免递归析构
    fn drop(&mut self) {
        let mut parent = self.parent.take();
        while let Some(node) = parent {
            match Arc::try_unwrap(node) {
                Ok(mut node) => parent = node.parent.take(),
                Err(_) => break,
            }
        }
    }
}

/// 不可变的解析路径
#[derive(Debug, Clone, Default)]
pub struct ResolveChain {
    head: Option<Arc<ChainNode>>,
    truncated: bool,
}

impl ResolveChain {
    /// 创建空路径
    pub fn new() -> Self {
        Self::default()
    }

    /// 路径长度
    pub fn len(&self) -> usize {
        self.head.as_ref().map_or(0, |node| node.len)
    }

    /// 路径是否为空
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// 路径是否被截断过
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// 追加一步，返回新路径
    pub fn add(&self, step: ResolveStep) -> Self {
        Self {
            head: Some(Arc::new(ChainNode {
                step,
                parent: self.head.clone(),
                len: self.len() + 1,
            })),
            truncated: self.truncated,
        }
    }

    /// 追加令牌
    pub fn add_token(&self, token: &InjectionToken) -> Self {
        self.add(ResolveStep::Token(token.clone()))
    }

    /// 追加构造器参数
    pub fn add_parameter(&self, constructor: &TypeInfo, index: usize, token: Option<&InjectionToken>) -> Self {
        self.add(ResolveStep::Parameter {
            constructor: constructor.clone(),
            index,
            token: token.cloned(),
        })
    }

    /// 追加属性
    pub fn add_property(&self, constructor: &TypeInfo, key: &str, token: Option<&InjectionToken>) -> Self {
        self.add(ResolveStep::Property {
            constructor: constructor.clone(),
            key: key.to_string(),
            token: token.cloned(),
        })
    }

    /// 按从根到叶的顺序返回所有步骤
    pub fn steps(&self) -> Vec<ResolveStep> {
        let mut steps = Vec::with_capacity(self.len());
        let mut current = self.head.as_deref();
        while let Some(node) = current {
            steps.push(node.step.clone());
            current = node.parent.as_deref();
        }
        steps.reverse();
        steps
    }

    /// 只保留最后 `length` 步
    pub fn truncate(&self, length: usize) -> Self {
        if self.len() <= length {
            return self.clone();
        }

        let steps = self.steps();
        let mut chain = Self::new();
        for step in steps.into_iter().skip(self.len() - length) {
            chain = chain.add(step);
        }
        chain.truncated = true;
        chain
    }
}

impl fmt::Display for ResolveChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.truncated {
            f.write_str("... -> ")?;
        }

        for (index, step) in self.steps().iter().enumerate() {
            if index > 0 {
                f.write_str(" -> ")?;
            }
            write!(f, "{step}")?;
        }

        Ok(())
    }
}
