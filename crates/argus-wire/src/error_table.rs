//! The fixed JDWP error table.
//!
//! Consulted when a reply carries a nonzero error code so the resulting
//! [`crate::JdwpError::Remote`] can name the failure; the core never
//! interprets the codes beyond this lookup.

/// Looks up the symbolic name and description for a JDWP error code.
pub fn lookup(code: u16) -> Option<(&'static str, &'static str)> {
    let entry = match code {
        0 => ("NONE", "No error has occurred."),
        10 => (
            "INVALID_THREAD",
            "Passed thread is null, is not a valid thread or has exited.",
        ),
        11 => ("INVALID_THREAD_GROUP", "Thread group invalid."),
        12 => ("INVALID_PRIORITY", "Invalid priority."),
        13 => (
            "THREAD_NOT_SUSPENDED",
            "If the specified thread has not been suspended by an event.",
        ),
        14 => ("THREAD_SUSPENDED", "Thread already suspended."),
        15 => (
            "THREAD_NOT_ALIVE",
            "Thread has not been started or is now dead.",
        ),
        20 => (
            "INVALID_OBJECT",
            "If this reference type has been unloaded and garbage collected.",
        ),
        21 => ("INVALID_CLASS", "Invalid class."),
        22 => (
            "CLASS_NOT_PREPARED",
            "Class has been loaded but not yet prepared.",
        ),
        23 => ("INVALID_METHODID", "Invalid method."),
        24 => ("INVALID_LOCATION", "Invalid location."),
        25 => ("INVALID_FIELDID", "Invalid field."),
        30 => ("INVALID_FRAMEID", "Invalid jframeID."),
        31 => (
            "NO_MORE_FRAMES",
            "There are no more Java or JNI frames on the call stack.",
        ),
        32 => (
            "OPAQUE_FRAME",
            "Information about the frame is not available.",
        ),
        33 => (
            "NOT_CURRENT_FRAME",
            "Operation can only be performed on current frame.",
        ),
        34 => (
            "TYPE_MISMATCH",
            "The variable is not an appropriate type for the function used.",
        ),
        35 => ("INVALID_SLOT", "Invalid slot."),
        40 => ("DUPLICATE", "Item already set."),
        41 => ("NOT_FOUND", "Desired element not found."),
        50 => ("INVALID_MONITOR", "Invalid monitor."),
        51 => (
            "NOT_MONITOR_OWNER",
            "This thread doesn't own the monitor.",
        ),
        52 => (
            "INTERRUPT",
            "The call has been interrupted before completion.",
        ),
        60 => (
            "INVALID_CLASS_FORMAT",
            "The virtual machine attempted to read a class file and determined that the file is malformed or otherwise cannot be interpreted as a class file.",
        ),
        61 => (
            "CIRCULAR_CLASS_DEFINITION",
            "A circularity has been detected while initializing a class.",
        ),
        62 => (
            "FAILS_VERIFICATION",
            "The verifier detected that a class file, though well formed, contained some sort of internal inconsistency or security problem.",
        ),
        63 => (
            "ADD_METHOD_NOT_IMPLEMENTED",
            "Adding methods has not been implemented.",
        ),
        64 => (
            "SCHEMA_CHANGE_NOT_IMPLEMENTED",
            "Schema change has not been implemented.",
        ),
        65 => (
            "INVALID_TYPESTATE",
            "The state of the thread has been modified, and is now inconsistent.",
        ),
        66 => (
            "HIERARCHY_CHANGE_NOT_IMPLEMENTED",
            "A direct superclass is different for the new class version, or the set of directly implemented interfaces is different and canUnrestrictedlyRedefineClasses is false.",
        ),
        67 => (
            "DELETE_METHOD_NOT_IMPLEMENTED",
            "The new class version does not declare a method declared in the old class version and canUnrestrictedlyRedefineClasses is false.",
        ),
        68 => (
            "UNSUPPORTED_VERSION",
            "A class file has a version number not supported by this VM.",
        ),
        69 => (
            "NAMES_DONT_MATCH",
            "The class name defined in the new class file is different from the name in the old class object.",
        ),
        70 => (
            "CLASS_MODIFIERS_CHANGE_NOT_IMPLEMENTED",
            "The new class version has different modifiers and canUnrestrictedlyRedefineClasses is false.",
        ),
        71 => (
            "METHOD_MODIFIERS_CHANGE_NOT_IMPLEMENTED",
            "A method in the new class version has different modifiers than its counterpart in the old class version and canUnrestrictedlyRedefineClasses is false.",
        ),
        99 => (
            "NOT_IMPLEMENTED",
            "The functionality is not implemented in this virtual machine.",
        ),
        100 => ("NULL_POINTER", "Invalid pointer."),
        101 => (
            "ABSENT_INFORMATION",
            "Desired information is not available.",
        ),
        102 => (
            "INVALID_EVENT_TYPE",
            "The specified event type id is not recognized.",
        ),
        103 => ("ILLEGAL_ARGUMENT", "Illegal argument."),
        110 => (
            "OUT_OF_MEMORY",
            "The function needed to allocate memory and no more memory was available for allocation.",
        ),
        111 => (
            "ACCESS_DENIED",
            "Debugging has not been enabled in this virtual machine. JVMTI cannot be used.",
        ),
        112 => ("VM_DEAD", "The virtual machine is not running."),
        113 => ("INTERNAL", "An unexpected internal error has occurred."),
        115 => (
            "UNATTACHED_THREAD",
            "The thread being used to call this function is not attached to the virtual machine. Calls must be made from attached threads.",
        ),
        500 => ("INVALID_TAG", "Object type id or class tag."),
        502 => ("ALREADY_INVOKING", "Previous invoke not complete."),
        503 => ("INVALID_INDEX", "Index is invalid."),
        504 => ("INVALID_LENGTH", "The length is invalid."),
        506 => ("INVALID_STRING", "The string is invalid."),
        507 => ("INVALID_CLASS_LOADER", "The class loader is invalid."),
        508 => ("INVALID_ARRAY", "The array is invalid."),
        509 => ("TRANSPORT_LOAD", "Unable to load the transport."),
        510 => ("TRANSPORT_INIT", "Unable to initialize the transport."),
        511 => ("NATIVE_METHOD", ""),
        512 => ("INVALID_COUNT", "The count is invalid."),
        _ => return None,
    };
    Some(entry)
}
