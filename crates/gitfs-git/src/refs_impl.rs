//! gix-backed ref read/update operations.

use gix::refs::transaction::{Change, LogChange, PreviousValue, RefEdit, RefLog};
use gix::refs::Target;

use crate::error::StoreError;
use crate::gix_store::GixStore;
use crate::types::{GitOid, RefName};

fn to_gix_oid(oid: GitOid) -> gix::ObjectId {
    gix::ObjectId::from_bytes_or_panic(oid.as_bytes())
}

fn from_gix_oid(oid: gix::ObjectId) -> GitOid {
    let bytes: [u8; 20] = oid.as_bytes().try_into().expect("SHA1 is 20 bytes");
    GitOid::from_bytes(bytes)
}

pub fn read_ref(repo: &GixStore, name: &RefName) -> Result<Option<GitOid>, StoreError> {
    match repo.repo.try_find_reference(name.as_str()) {
        Ok(Some(mut ref_)) => {
            let id = ref_.peel_to_id_in_place().map_err(|e| StoreError::BackendError {
                message: format!("failed to peel ref '{name}': {e}"),
            })?;
            Ok(Some(from_gix_oid(id.detach())))
        }
        Ok(None) => Ok(None),
        Err(e) => Err(StoreError::BackendError {
            message: format!("failed to read ref '{name}': {e}"),
        }),
    }
}

pub fn update_ref(
    repo: &GixStore,
    name: &RefName,
    expected_old: Option<GitOid>,
    new_value: GitOid,
    force: bool,
    reflog_message: &str,
) -> Result<(), StoreError> {
    let expected = if force {
        PreviousValue::Any
    } else {
        match expected_old {
            Some(old) => PreviousValue::MustExistAndMatch(Target::Object(to_gix_oid(old))),
            None => PreviousValue::MustNotExist,
        }
    };

    let edit = RefEdit {
        change: Change::Update {
            log: LogChange {
                mode: RefLog::AndReference,
                force_create_reflog: false,
                message: reflog_message.into(),
            },
            expected,
            new: Target::Object(to_gix_oid(new_value)),
        },
        name: name
            .as_str()
            .try_into()
            .map_err(|e| StoreError::InvalidOid {
                value: name.as_str().to_owned(),
                reason: format!("not a valid full ref name: {e}"),
            })?,
        deref: false,
    };

    repo.repo
        .edit_reference(edit)
        .map_err(|e| StoreError::RefConflict {
            ref_name: name.as_str().to_owned(),
            message: e.to_string(),
        })?;
    Ok(())
}
