use conduit_core::ConduitError;

/// 描述一次底层操作，用于取消/超时错误中的操作名。
#[derive(Clone, Copy, Debug)]
pub(crate) struct OperationKind {
    pub name: &'static str,
}

pub(crate) const CONNECT: OperationKind = OperationKind {
    name: "tcp connect",
};
pub(crate) const BIND: OperationKind = OperationKind { name: "tcp bind" };

/// 构造取消错误。
pub(crate) fn cancelled_error(kind: OperationKind) -> ConduitError {
    ConduitError::Cancelled {
        operation: kind.name,
    }
}

/// 构造超时错误。
pub(crate) fn timeout_error(kind: OperationKind) -> ConduitError {
    ConduitError::Timeout {
        operation: kind.name,
    }
}
