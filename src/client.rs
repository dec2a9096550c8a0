//! The client session: one association at a time over a caller-supplied
//! transport, every public operation serialised by an internal lock.
//!
//! Lifecycle: `Idle → connect() → Connected → associate() → Associated`.
//! `release()` returns to Connected, `disconnect()` to Idle. A transport
//! failure mid-operation tears the session down to Idle because a half-read
//! exchange cannot guarantee protocol invariants; security failures drop
//! the association but keep the transport.

use std::sync::Mutex;

use crate::action::{ActionRequest, ActionRequestNormal, ActionResponse, ActionResult, MethodDescriptor};
use crate::association::{
    encode_aarq, Aare, Conformance, InitiateResponse, ReleaseRequest, ReleaseResponse,
    INITIATE_RESPONSE_TAG,
};
use crate::axdr::Data;
use crate::error::{Error, Result};
use crate::get::{
    AttributeDescriptor, DataBlockResult, GetDataResult, GetRequest, GetRequestNext,
    GetRequestNormal, GetResponse, GetResponseWithDataBlock,
};
use crate::security::{self, GLO_INITIATE_RESPONSE};
use crate::selective_access::SelectiveAccess;
use crate::set::{
    DataBlock, SetRequest, SetRequestNormal, SetRequestWithDataBlock,
    SetRequestWithFirstDataBlock, SetResponse,
};
use crate::settings::Settings;
use crate::transport::Transport;

/// invoke-id-and-priority used on the unicast path: invoke-id 1, service
/// class Confirmed, priority High.
pub const UNICAST_INVOKE_ID: u8 = 0xC1;

/// Fixed per-PDU overhead reserved when chunking a streamed SET value:
/// tag, choice, invoke-id, attribute descriptor, access flag, last-block
/// flag, block number and a worst-case length prefix.
const SET_FIRST_BLOCK_OVERHEAD: usize = 21;
const SET_NEXT_BLOCK_OVERHEAD: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Connected,
    Associated,
}

/// Parameters negotiated by a successful AARQ/AARE exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Association {
    pub server_max_pdu_size: u16,
    pub conformance: Conformance,
    pub server_system_title: Option<[u8; 8]>,
}

struct Session<T: Transport> {
    transport: T,
    settings: Settings,
    state: State,
    association: Option<Association>,
    /// Highest invocation counter accepted from the server.
    server_invocation_counter: Option<u32>,
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if self.state != State::Idle {
            let _ = self.transport.disconnect();
        }
    }
}

/// DLMS/COSEM client.
///
/// All operations lock the session for their whole duration, block-transfer
/// round trips included, so concurrent callers are serialised and the
/// invocation counter increases monotonically across operations.
pub struct Client<T: Transport> {
    session: Mutex<Session<T>>,
}

impl<T: Transport> Client<T> {
    pub fn new(settings: Settings, transport: T) -> Self {
        Self {
            session: Mutex::new(Session {
                transport,
                settings,
                state: State::Idle,
                association: None,
                server_invocation_counter: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Session<T>> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Open the transport.
    pub fn connect(&self) -> Result<()> {
        let mut session = self.lock();
        if session.state != State::Idle {
            return Ok(());
        }
        session.transport.connect().map_err(Error::transport)?;
        session.state = State::Connected;
        Ok(())
    }

    /// Close the transport, regardless of association state.
    pub fn disconnect(&self) -> Result<()> {
        let mut session = self.lock();
        session.association = None;
        session.state = State::Idle;
        session.transport.disconnect().map_err(Error::transport)
    }

    pub fn is_connected(&self) -> bool {
        self.lock().state != State::Idle
    }

    pub fn is_associated(&self) -> bool {
        self.lock().state == State::Associated
    }

    /// The negotiated association parameters, while associated.
    pub fn association(&self) -> Option<Association> {
        self.lock().association.clone()
    }

    /// Send the AARQ and process the AARE.
    pub fn associate(&self) -> Result<()> {
        let mut session = self.lock();
        match session.state {
            State::Idle => return Err(Error::NotConnected),
            State::Associated => return Ok(()),
            State::Connected => {}
        }
        session.associate()
    }

    /// Send the RLRQ and await the RLRE. The association is considered gone
    /// even when the exchange fails; the transport stays open.
    pub fn release(&self) -> Result<()> {
        let mut session = self.lock();
        if session.state != State::Associated {
            return Ok(());
        }
        session.association = None;
        session.state = State::Connected;

        let request = ReleaseRequest::normal().encode();
        let reply = session.transport.send(&request).map_err(Error::transport)?;
        ReleaseResponse::decode(&reply)?;
        Ok(())
    }

    /// Read one attribute, reassembling block-transferred replies.
    pub fn get(
        &self,
        attribute: &AttributeDescriptor,
        access: Option<SelectiveAccess>,
    ) -> Result<Data> {
        let mut session = self.lock();
        session.ensure_associated()?;
        session.get(attribute, access)
    }

    /// Write one attribute, streaming values beyond the PDU budget in blocks.
    pub fn set(&self, attribute: &AttributeDescriptor, value: Data) -> Result<()> {
        let mut session = self.lock();
        session.ensure_associated()?;
        session.set(attribute, &value)
    }

    /// Write several attributes, one SET exchange each.
    ///
    /// With `continue_on_rejected`, rejected writes do not stop the walk;
    /// when some writes landed and others failed the error is
    /// [`Error::SetPartial`].
    pub fn set_many(
        &self,
        values: &[(AttributeDescriptor, Data)],
        continue_on_rejected: bool,
    ) -> Result<()> {
        let mut session = self.lock();
        session.ensure_associated()?;

        let mut something_done = false;
        let mut last_rejection: Option<Error> = None;

        for (attribute, value) in values {
            match session.set(attribute, value) {
                Ok(()) => something_done = true,
                Err(err @ Error::SetRejected(_)) if continue_on_rejected => {
                    last_rejection = Some(err);
                }
                Err(err) => {
                    return if something_done {
                        Err(Error::SetPartial(Box::new(err)))
                    } else {
                        Err(err)
                    };
                }
            }
        }

        match last_rejection {
            Some(err) if something_done => Err(Error::SetPartial(Box::new(err))),
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Invoke one method, returning its optional result data.
    pub fn action(
        &self,
        method: &MethodDescriptor,
        parameters: Option<Data>,
    ) -> Result<Option<Data>> {
        let mut session = self.lock();
        session.ensure_associated()?;
        session.action(method, parameters)
    }
}

impl<T: Transport> Session<T> {
    fn ensure_associated(&self) -> Result<()> {
        match self.state {
            State::Idle => Err(Error::NotConnected),
            State::Connected => Err(Error::NotAssociated),
            State::Associated => Ok(()),
        }
    }

    /// The transport is unusable; tear everything down.
    fn fail_transport(&mut self) {
        self.association = None;
        self.state = State::Idle;
        let _ = self.transport.disconnect();
    }

    /// Protocol invariants for this association are gone; keep the transport.
    fn drop_association(&mut self) {
        self.association = None;
        if self.state == State::Associated {
            self.state = State::Connected;
        }
    }

    fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        match self.transport.send(request) {
            Ok(reply) => Ok(reply),
            Err(err) => {
                self.fail_transport();
                Err(Error::transport(err))
            }
        }
    }

    fn associate(&mut self) -> Result<()> {
        let request = encode_aarq(&mut self.settings)?;
        let reply = self.exchange(&request)?;
        let aare = Aare::decode(&reply)?;

        if !aare.is_accepted() {
            return Err(Error::AssociationRejected {
                result: aare.result,
                diagnostic: aare.source_diagnostic,
            });
        }

        let server_system_title = match aare.responding_ap_title.as_deref() {
            Some(title) => {
                Some(<[u8; 8]>::try_from(title).map_err(|_| {
                    Error::InvalidResponse("responding-AP-title is not eight bytes")
                })?)
            }
            None => None,
        };

        let user_information =
            aare.user_information.ok_or(Error::InvalidResponse("AARE missing initiate-response"))?;
        let initiate = self.read_initiate_response(&user_information, server_system_title)?;

        self.association = Some(Association {
            server_max_pdu_size: initiate.server_max_receive_pdu_size,
            conformance: initiate.negotiated_conformance,
            server_system_title,
        });
        self.state = State::Associated;
        Ok(())
    }

    fn read_initiate_response(
        &mut self,
        user_information: &[u8],
        server_system_title: Option<[u8; 8]>,
    ) -> Result<InitiateResponse> {
        let (&tag, _) = user_information.split_first().ok_or(Error::Truncated)?;

        let plain;
        let body: &[u8] = if tag == INITIATE_RESPONSE_TAG {
            user_information
        } else if tag == GLO_INITIATE_RESPONSE {
            let title = server_system_title
                .ok_or(Error::InvalidResponse("ciphered AARE without responding-AP-title"))?;
            let (_, counter, plaintext) = security::unwrap(
                user_information,
                &title,
                &self.settings.ciphering.unicast_key,
                &self.settings.ciphering.authentication_key,
            )?;
            self.accept_server_counter(counter)?;
            plain = plaintext;
            &plain
        } else {
            return Err(Error::InvalidResponse("unexpected user-information APDU"));
        };

        match InitiateResponse::parse(body) {
            Ok((_, initiate)) => Ok(initiate),
            Err(_) => Err(Error::InvalidResponse("malformed initiate-response")),
        }
    }

    fn accept_server_counter(&mut self, counter: u32) -> Result<()> {
        if let Some(last) = self.server_invocation_counter {
            if counter <= last {
                self.drop_association();
                return Err(Error::ReplayDetected);
            }
        }
        self.server_invocation_counter = Some(counter);
        Ok(())
    }

    /// Send one service APDU, glo-wrapping and unwrapping when ciphering is on.
    fn send_service(&mut self, plain: &[u8]) -> Result<Vec<u8>> {
        if !self.settings.ciphering.is_enabled() {
            return self.exchange(plain);
        }

        let glo_tag = security::glo_tag_for(plain[0])
            .ok_or(Error::InvalidParameter("APDU has no ciphered form"))?;
        let system_title = self
            .settings
            .ciphering
            .system_title
            .ok_or(Error::InvalidParameter("ciphering requires a system title"))?;
        let counter = self.settings.ciphering.invocation_counter;
        let wrapped = security::wrap(
            glo_tag,
            self.settings.ciphering.security,
            &system_title,
            &self.settings.ciphering.unicast_key,
            &self.settings.ciphering.authentication_key,
            counter,
            plain,
        )?;
        self.settings.ciphering.invocation_counter += 1;

        let reply = self.exchange(&wrapped)?;

        let server_title = self
            .association
            .as_ref()
            .and_then(|association| association.server_system_title)
            .ok_or(Error::InvalidResponse("server system title unknown"))?;
        let unwrapped = security::unwrap(
            &reply,
            &server_title,
            &self.settings.ciphering.unicast_key,
            &self.settings.ciphering.authentication_key,
        );
        let (_, reply_counter, plaintext) = match unwrapped {
            Ok(frame) => frame,
            Err(err) => {
                self.drop_association();
                return Err(err);
            }
        };
        self.accept_server_counter(reply_counter)?;
        Ok(plaintext)
    }

    fn get(
        &mut self,
        attribute: &AttributeDescriptor,
        access: Option<SelectiveAccess>,
    ) -> Result<Data> {
        let request = GetRequest::Normal(GetRequestNormal {
            invoke_id: UNICAST_INVOKE_ID,
            attribute: *attribute,
            access,
        })
        .encode()?;
        let reply = self.send_service(&request)?;
        let (response, _) = GetResponse::decode(&reply)?;

        match response {
            GetResponse::Normal(normal) => {
                check_invoke_id(normal.invoke_id)?;
                match normal.result {
                    GetDataResult::Data(data) => Ok(data),
                    GetDataResult::AccessError(code) => Err(Error::GetRejected(code)),
                }
            }
            GetResponse::WithDataBlock(block) => self.reassemble_blocks(block),
            GetResponse::WithList(_) => Err(Error::InvalidResponse("unexpected with-list reply")),
        }
    }

    fn reassemble_blocks(&mut self, first: GetResponseWithDataBlock) -> Result<Data> {
        let mut buffer = Vec::new();
        let mut expected = 1u32;
        let mut block = first;

        loop {
            check_invoke_id(block.invoke_id)?;
            if block.block_number != expected {
                self.drop_association();
                return Err(Error::BlockSequence {
                    expected,
                    received: block.block_number,
                });
            }
            match block.result {
                DataBlockResult::Raw(raw) => buffer.extend_from_slice(&raw),
                DataBlockResult::AccessError(code) => return Err(Error::GetRejected(code)),
            }
            if block.last_block {
                break;
            }

            let request = GetRequest::Next(GetRequestNext {
                invoke_id: UNICAST_INVOKE_ID,
                block_number: block.block_number,
            })
            .encode()?;
            let reply = self.send_service(&request)?;
            block = match GetResponse::decode(&reply)?.0 {
                GetResponse::WithDataBlock(next) => next,
                _ => return Err(Error::InvalidResponse("expected datablock reply")),
            };
            expected += 1;
        }

        let (data, consumed) = Data::decode(&buffer)?;
        if consumed != buffer.len() {
            return Err(Error::InvalidResponse("trailing bytes after reassembled value"));
        }
        Ok(data)
    }

    fn set(&mut self, attribute: &AttributeDescriptor, value: &Data) -> Result<()> {
        let encoded = value.encode()?;
        let budget = self.pdu_budget();

        // tag + choice + invoke-id + descriptor + access flag + value
        if 3 + 9 + 1 + encoded.len() <= budget {
            return self.set_normal(attribute, value);
        }
        self.set_blocks(attribute, &encoded, budget)
    }

    fn pdu_budget(&self) -> usize {
        let local = self.settings.max_pdu_size;
        let remote = self
            .association
            .as_ref()
            .map(|association| association.server_max_pdu_size)
            .filter(|&size| size != 0)
            .unwrap_or(local);
        local.min(remote) as usize
    }

    fn set_normal(&mut self, attribute: &AttributeDescriptor, value: &Data) -> Result<()> {
        let request = SetRequest::Normal(SetRequestNormal {
            invoke_id: UNICAST_INVOKE_ID,
            attribute: *attribute,
            access: None,
            value: value.clone(),
        })
        .encode()?;
        let reply = self.send_service(&request)?;
        match SetResponse::decode(&reply)?.0 {
            SetResponse::Normal(normal) => {
                check_invoke_id(normal.invoke_id)?;
                match normal.result {
                    crate::get::DataAccessResult::Success => Ok(()),
                    code => Err(Error::SetRejected(code)),
                }
            }
            _ => Err(Error::InvalidResponse("expected SET-Response-Normal")),
        }
    }

    fn set_blocks(
        &mut self,
        attribute: &AttributeDescriptor,
        encoded: &[u8],
        budget: usize,
    ) -> Result<()> {
        let first_chunk = budget.saturating_sub(SET_FIRST_BLOCK_OVERHEAD);
        let next_chunk = budget.saturating_sub(SET_NEXT_BLOCK_OVERHEAD);
        if first_chunk == 0 || next_chunk == 0 {
            return Err(Error::InvalidParameter("negotiated PDU size too small for blocks"));
        }

        let mut remaining = encoded;
        let mut block_number = 1u32;

        loop {
            let chunk_size = if block_number == 1 { first_chunk } else { next_chunk };
            let take = chunk_size.min(remaining.len());
            let (chunk, rest) = remaining.split_at(take);
            remaining = rest;
            let last_block = remaining.is_empty();

            let block =
                DataBlock { last_block, block_number, raw: chunk.to_vec() };
            let request = if block_number == 1 {
                SetRequest::WithFirstDataBlock(SetRequestWithFirstDataBlock {
                    invoke_id: UNICAST_INVOKE_ID,
                    attribute: *attribute,
                    access: None,
                    block,
                })
            } else {
                SetRequest::WithDataBlock(SetRequestWithDataBlock {
                    invoke_id: UNICAST_INVOKE_ID,
                    block,
                })
            }
            .encode()?;

            let reply = self.send_service(&request)?;
            match SetResponse::decode(&reply)?.0 {
                SetResponse::DataBlock(ack) if !last_block => {
                    check_invoke_id(ack.invoke_id)?;
                    if ack.block_number != block_number {
                        self.drop_association();
                        return Err(Error::BlockSequence {
                            expected: block_number,
                            received: ack.block_number,
                        });
                    }
                }
                SetResponse::LastDataBlock(done) if last_block => {
                    check_invoke_id(done.invoke_id)?;
                    return match done.result {
                        crate::get::DataAccessResult::Success => Ok(()),
                        code => Err(Error::SetRejected(code)),
                    };
                }
                _ => return Err(Error::InvalidResponse("unexpected SET block reply")),
            }
            block_number += 1;
        }
    }

    fn action(
        &mut self,
        method: &MethodDescriptor,
        parameters: Option<Data>,
    ) -> Result<Option<Data>> {
        let request = ActionRequest::Normal(ActionRequestNormal {
            invoke_id: UNICAST_INVOKE_ID,
            method: *method,
            parameters,
        })
        .encode()?;
        let reply = self.send_service(&request)?;
        let ActionResponse::Normal(normal) = ActionResponse::decode(&reply)?.0;
        check_invoke_id(normal.invoke_id)?;
        if normal.result != ActionResult::Success {
            return Err(Error::ActionRejected(normal.result));
        }
        match normal.return_parameters {
            Some(GetDataResult::Data(data)) => Ok(Some(data)),
            Some(GetDataResult::AccessError(_)) => {
                Err(Error::ActionRejected(ActionResult::OtherReason))
            }
            None => Ok(None),
        }
    }
}

fn check_invoke_id(invoke_id: u8) -> Result<()> {
    if invoke_id != UNICAST_INVOKE_ID {
        return Err(Error::InvalidResponse("invoke-id mismatch"));
    }
    Ok(())
}
